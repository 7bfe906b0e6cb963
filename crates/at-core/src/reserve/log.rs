//! Reserve writer that emits records as structured log events.

use at_common::Result;
use tracing::error;

use super::{ReserveEntry, ReserveWriter};
use crate::logging::RESERVE_TARGET;

/// Emits each record as an error event on the reserve log target.
///
/// Accepts everything, so it belongs at the end of the chain.
#[derive(Debug, Default)]
pub struct LogReserveWriter;

impl LogReserveWriter {
    pub fn new() -> Self {
        LogReserveWriter
    }
}

impl ReserveWriter for LogReserveWriter {
    fn name(&self) -> &'static str {
        "log"
    }

    fn write(&mut self, entry: &ReserveEntry) -> Result<()> {
        let row = serde_json::to_string(&entry.row)?;
        error!(
            target: RESERVE_TARGET,
            generation = entry.generation,
            error = entry.error.as_deref().unwrap_or(""),
            row = %row,
            "audit record reserved"
        );
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
