//! Ingestion pipeline: caller batches, the bounded queue and the workers.

pub mod batch;
pub mod executor;
pub mod queue;

pub use batch::AuditBatch;
pub use executor::{Pipeline, PipelineStats};
pub use queue::BoundedQueue;
