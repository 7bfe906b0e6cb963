//! Reserve chain: fallback sinks for records storage did not accept.
//!
//! Writers are tried in order and the first one that accepts a record wins.
//! A record every writer rejects is logged as lost.

pub mod file;
pub mod log;

pub use file::{read_reserve_file, FileReserveWriter};
pub use log::LogReserveWriter;

use at_common::{Error, Result};
use at_config::{ReserveConfig, ReserveKind};
use at_store::Row;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::logging::RESERVE_TARGET;

/// One diverted record in storage form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveEntry {
    /// Delivery attempts so far.
    pub generation: u32,
    /// Last storage error, if the record was diverted after a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub reserved_at: DateTime<Utc>,
    pub row: Row,
}

impl ReserveEntry {
    pub fn new(row: Row, generation: u32, error: Option<String>) -> Self {
        ReserveEntry {
            generation,
            error,
            reserved_at: Utc::now(),
            row,
        }
    }
}

/// A fallback sink.
pub trait ReserveWriter: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Accept one record. An error passes it to the next writer.
    fn write(&mut self, entry: &ReserveEntry) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

/// Ordered reserve writers.
pub struct ReserveChain {
    writers: Vec<Box<dyn ReserveWriter>>,
    accepted: u64,
    lost: u64,
    closed: bool,
}

impl ReserveChain {
    pub fn new(writers: Vec<Box<dyn ReserveWriter>>) -> Self {
        ReserveChain {
            writers,
            accepted: 0,
            lost: 0,
            closed: false,
        }
    }

    /// Build the configured writers.
    pub fn from_config(config: &ReserveConfig) -> Result<Self> {
        let mut writers: Vec<Box<dyn ReserveWriter>> = Vec::with_capacity(config.writers.len());
        for kind in &config.writers {
            match kind {
                ReserveKind::File => writers.push(Box::new(FileReserveWriter::new(&config.path))),
                ReserveKind::Log => writers.push(Box::new(LogReserveWriter::new())),
                ReserveKind::S3 => {
                    return Err(Error::Config(
                        "the s3 reserve writer is not supported by this build".to_string(),
                    ))
                }
            }
        }
        Ok(ReserveChain::new(writers))
    }

    /// Hand a record to the first writer that accepts it.
    ///
    /// Returns false when every writer rejected it.
    pub fn write(&mut self, entry: &ReserveEntry) -> bool {
        if !self.closed {
            for writer in &mut self.writers {
                match writer.write(entry) {
                    Ok(()) => {
                        debug!(writer = writer.name(), generation = entry.generation, "record reserved");
                        self.accepted += 1;
                        return true;
                    }
                    Err(e) => {
                        warn!(writer = writer.name(), error = %e, "reserve writer rejected record");
                    }
                }
            }
        }
        self.lost += 1;
        let row = serde_json::to_string(&entry.row).unwrap_or_default();
        error!(
            target: RESERVE_TARGET,
            generation = entry.generation,
            row = %row,
            "audit record lost"
        );
        false
    }

    /// Flush every writer, logging failures.
    pub fn flush(&mut self) {
        for writer in &mut self.writers {
            if let Err(e) = writer.flush() {
                warn!(writer = writer.name(), error = %e, "reserve flush failed");
            }
        }
    }

    /// Flush and close every writer. Later writes count as lost.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        for writer in &mut self.writers {
            if let Err(e) = writer.close() {
                warn!(writer = writer.name(), error = %e, "reserve close failed");
            }
        }
        self.closed = true;
        debug!(accepted = self.accepted, lost = self.lost, "reserve chain closed");
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn lost(&self) -> u64 {
        self.lost
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ReserveChain {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ReserveChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReserveChain")
            .field(
                "writers",
                &self.writers.iter().map(|w| w.name()).collect::<Vec<_>>(),
            )
            .field("accepted", &self.accepted)
            .field("lost", &self.lost)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use at_common::Value;
    use std::sync::{Arc, Mutex};

    struct Recording {
        name: &'static str,
        accept: bool,
        seen: Arc<Mutex<Vec<u32>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl ReserveWriter for Recording {
        fn name(&self) -> &'static str {
            self.name
        }
        fn write(&mut self, entry: &ReserveEntry) -> Result<()> {
            self.seen.lock().unwrap().push(entry.generation);
            if self.accept {
                Ok(())
            } else {
                Err(Error::Storage("sink down".into()))
            }
        }
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn recording(name: &'static str, accept: bool) -> (Box<dyn ReserveWriter>, Arc<Mutex<Vec<u32>>>, Arc<Mutex<bool>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Mutex::new(false));
        (
            Box::new(Recording {
                name,
                accept,
                seen: seen.clone(),
                closed: closed.clone(),
            }),
            seen,
            closed,
        )
    }

    fn entry(generation: u32) -> ReserveEntry {
        ReserveEntry::new(Row::new().with("IdColumn", Value::Long(1)), generation, None)
    }

    #[test]
    fn test_first_accepting_writer_wins() {
        let (failing, failing_seen, _) = recording("failing", false);
        let (ok, ok_seen, _) = recording("ok", true);
        let (never, never_seen, _) = recording("never", true);
        let mut chain = ReserveChain::new(vec![failing, ok, never]);

        assert!(chain.write(&entry(2)));
        assert_eq!(*failing_seen.lock().unwrap(), vec![2]);
        assert_eq!(*ok_seen.lock().unwrap(), vec![2]);
        assert!(never_seen.lock().unwrap().is_empty());
        assert_eq!(chain.accepted(), 1);
    }

    #[test]
    fn test_all_rejecting_counts_lost() {
        let (a, _, _) = recording("a", false);
        let (b, _, _) = recording("b", false);
        let mut chain = ReserveChain::new(vec![a, b]);
        assert!(!chain.write(&entry(3)));
        assert_eq!(chain.lost(), 1);
    }

    #[test]
    fn test_drop_closes_writers() {
        let (w, _, closed) = recording("w", true);
        {
            let _chain = ReserveChain::new(vec![w]);
        }
        assert!(*closed.lock().unwrap());
    }

    #[test]
    fn test_closed_chain_loses_records() {
        let (w, seen, _) = recording("w", true);
        let mut chain = ReserveChain::new(vec![w]);
        chain.close();
        assert!(chain.is_closed());
        assert!(!chain.write(&entry(1)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_s3_is_rejected() {
        let config = ReserveConfig {
            writers: vec![ReserveKind::Log, ReserveKind::S3],
            ..ReserveConfig::default()
        };
        assert!(matches!(
            ReserveChain::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failing_reserve_file_falls_through_to_next_writer() {
        let (fallback, fallback_seen, _) = recording("fallback", true);
        let mut chain = ReserveChain::new(vec![
            Box::new(FileReserveWriter::new("/dev/full")) as Box<dyn ReserveWriter>,
            fallback,
        ]);

        assert!(chain.write(&entry(2)));
        assert_eq!(*fallback_seen.lock().unwrap(), vec![2]);
        chain.close();
        assert_eq!(chain.accepted(), 1);
        assert_eq!(chain.lost(), 0);
    }
}
