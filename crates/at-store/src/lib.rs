//! Audit trail storage gateway.
//!
//! This crate provides:
//! - The `StorageGateway` contract the ingestion engine writes and reads through
//! - Column, row and query models shared by every gateway
//! - `MemoryGateway`, an append-only in-memory column store
//! - `ParquetGateway`, an append-only on-disk store with one Parquet file per batch

pub mod column;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod parquet_gateway;
pub mod query;
pub mod row;
pub mod schema;

pub use column::{ColumnHeader, ColumnType, TableHeader};
pub use error::StoreError;
pub use gateway::StorageGateway;
pub use memory::MemoryGateway;
pub use parquet_gateway::{ParquetGateway, ParquetOptions};
pub use query::{Filter, Limit, OrderBy, Query};
pub use row::{Cell, Row};

/// Name of the per-table schema file written by on-disk gateways.
pub const SCHEMA_FILENAME: &str = "schema.json";
