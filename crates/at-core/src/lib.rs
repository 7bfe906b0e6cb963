//! Audit trail engine.
//!
//! Application objects are mapped onto columns by registered presenters,
//! staged per caller in an [`AuditBatch`], committed into a bounded queue and
//! written to storage by a pool of workers. Records that cannot be stored go
//! to the reserve chain; the query side resolves versions and soft deletes
//! before handing records back.
//!
//! - [`types`]: object and information types and the [`TypeRegistry`]
//! - [`record`]: record model in its storage and application forms
//! - [`pipeline`]: batches, the queue and the workers
//! - [`reserve`]: fallback writers for records storage refused
//! - [`dao`]: schema-aware storage access
//! - [`api`]: the [`AuditApi`] facade

pub mod api;
pub mod dao;
pub mod deserialize;
pub mod exit_codes;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod replay;
pub mod reserve;
pub mod resolve;
pub mod schema_sync;
pub mod serializer;
pub mod types;

pub use api::AuditApi;
pub use dao::AuditDao;
pub use deserialize::deserialize_records;
pub use exit_codes::ExitCode;
pub use pipeline::{AuditBatch, Pipeline, PipelineStats};
pub use record::{
    mark_deleted, new_version, AuditObject, AuditRecord, AuditRecordInternal, InformationObject,
    InformationSet, PendingRecord, RetryState,
};
pub use replay::{replay_entries, replay_file, ReplayReport};
pub use reserve::{
    read_reserve_file, FileReserveWriter, LogReserveWriter, ReserveChain, ReserveEntry,
    ReserveWriter,
};
pub use resolve::Resolver;
pub use schema_sync::SchemaSynchronizer;
pub use serializer::RecordSerializer;
pub use types::object::AnyObject;
pub use types::{
    InformationPresenter, InformationRole, InformationType, IntPresenter, LongPresenter,
    ObjectPresenter, ObjectState, ObjectType, RegistryListener, ServiceInformation, StateType,
    StringPresenter, TypeKey, TypeRegistry,
};

pub use at_common::{Error, Result, Value};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
