//! Re-inserting reserved records into storage.
//!
//! A reserve file is replayed all at once. Entries past the maximum
//! generation are skipped and kept in the file; everything else goes in as
//! one batch. If the insert fails the file is left as it was.

use std::fs;
use std::io::Write;
use std::path::Path;

use at_common::{Error, Result};
use at_store::StorageGateway;
use serde::Serialize;
use tracing::{info, warn};

use crate::reserve::{read_reserve_file, ReserveEntry};

/// Outcome of a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub replayed: usize,
    pub skipped: usize,
}

/// Insert reserved rows into a table.
///
/// Every column an entry carries must already exist in the table.
pub fn replay_entries(
    gateway: &dyn StorageGateway,
    table: &str,
    entries: &[ReserveEntry],
    max_generation: u32,
) -> Result<(ReplayReport, Vec<ReserveEntry>)> {
    let header = gateway.table_header(table)?;
    let (eligible, skipped): (Vec<&ReserveEntry>, Vec<&ReserveEntry>) = entries
        .iter()
        .partition(|e| e.generation <= max_generation);

    for entry in &eligible {
        if let Some(column) = entry.row.columns().find(|c| !header.has_column(c)) {
            return Err(Error::Storage(format!(
                "reserved row has column {} missing from table {}",
                column, table
            )));
        }
    }

    let rows: Vec<_> = eligible.iter().map(|e| e.row.clone()).collect();
    if !rows.is_empty() {
        gateway.insert_batch(table, &header.columns, &rows)?;
    }
    for entry in &skipped {
        warn!(
            generation = entry.generation,
            max_generation, "skipping reserved record past max generation"
        );
    }

    let report = ReplayReport {
        replayed: rows.len(),
        skipped: skipped.len(),
    };
    Ok((report, skipped.into_iter().cloned().collect()))
}

/// Replay a reserve file and rewrite it with only the skipped entries.
///
/// The file is removed when nothing was skipped.
pub fn replay_file(
    gateway: &dyn StorageGateway,
    table: &str,
    path: &Path,
    max_generation: u32,
) -> Result<ReplayReport> {
    let entries = read_reserve_file(path)?;
    let (report, kept) = replay_entries(gateway, table, &entries, max_generation)?;

    if kept.is_empty() {
        fs::remove_file(path)?;
    } else {
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            for entry in &kept {
                serde_json::to_writer(&mut file, entry)?;
                file.write_all(b"\n")?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
    }

    info!(
        path = %path.display(),
        replayed = report.replayed,
        skipped = report.skipped,
        "reserve file replayed"
    );
    Ok(report)
}
