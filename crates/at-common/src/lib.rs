//! Audit trail common types and errors.
//!
//! This crate provides the foundations shared by the storage layer and the
//! ingestion engine:
//! - Scalar storage kinds (`InnerType`) and tagged values (`Value`)
//! - The unified error taxonomy with stable codes

pub mod error;
pub mod value;

pub use error::{Error, ErrorCategory, Result};
pub use value::{epoch_date, InnerType, Value};
