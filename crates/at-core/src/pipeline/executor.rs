//! Worker pool draining the queue into storage.
//!
//! Each worker fills a local buffer from the queue and inserts it as one
//! batch once the buffer is full or the queue runs dry. A failed insert
//! bumps every record's generation; records past the configured maximum are
//! dropped, the rest go to the reserve chain (or back to the queue when
//! in-process retry is enabled).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use at_common::{Error, Result};
use at_config::{QueueConfig, ReserveConfig};
use tracing::{debug, error, info, warn};

use super::queue::BoundedQueue;
use crate::dao::AuditDao;
use crate::record::PendingRecord;
use crate::reserve::{ReserveChain, ReserveEntry};

/// Counts of what happened to records after they left the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub stored: u64,
    pub requeued: u64,
    pub reserved: u64,
    pub dropped: u64,
    pub lost: u64,
}

struct Shared {
    queue: BoundedQueue<PendingRecord>,
    dao: Arc<AuditDao>,
    reserve: Mutex<ReserveChain>,
    stats: Mutex<PipelineStats>,
    shutting_down: AtomicBool,
    force_stop: AtomicBool,
    live_workers: Mutex<usize>,
    workers_done: Condvar,
    buffer_capacity: usize,
    wait: Duration,
    max_generation: u32,
    requeue_on_failure: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn record_stat(&self, f: impl FnOnce(&mut PipelineStats)) {
        f(&mut lock(&self.stats));
    }

    fn flush(&self, buffer: &mut Vec<PendingRecord>) {
        let batch = std::mem::take(buffer);
        match self.dao.save_records(batch.iter().map(|p| &p.record)) {
            Ok(()) => {
                debug!(records = batch.len(), "flushed audit batch");
                self.record_stat(|s| s.stored += batch.len() as u64);
            }
            Err(e) => {
                warn!(records = batch.len(), error = %e, "audit batch insert failed");
                let message = e.to_string();
                for pending in batch {
                    self.handle_failure(pending, &message);
                }
            }
        }
    }

    fn handle_failure(&self, mut pending: PendingRecord, message: &str) {
        let generation = pending.fail(message);
        if generation > self.max_generation {
            error!(
                generation,
                max_generation = self.max_generation,
                id = ?pending.record.id(),
                error = message,
                "dropping audit record past max generation"
            );
            self.record_stat(|s| s.dropped += 1);
            return;
        }

        if self.requeue_on_failure && !self.shutting_down.load(Ordering::SeqCst) {
            pending = match self.queue.try_push(pending) {
                Ok(()) => {
                    debug!(generation, "requeued failed audit record");
                    self.record_stat(|s| s.requeued += 1);
                    return;
                }
                Err(back) => back,
            };
        }
        self.divert(&pending);
    }

    fn divert(&self, pending: &PendingRecord) {
        let row = self.dao.serializer().to_row(&pending.record);
        let entry = ReserveEntry::new(row, pending.generation(), pending.retry.last_error.clone());
        let accepted = lock(&self.reserve).write(&entry);
        if accepted {
            self.record_stat(|s| s.reserved += 1);
        } else {
            self.record_stat(|s| s.lost += 1);
        }
    }

    fn wait_for_workers(&self, timeout: Duration) -> bool {
        let live = lock(&self.live_workers);
        let (live, _) = self
            .workers_done
            .wait_timeout_while(live, timeout, |n| *n > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *live == 0
    }
}

/// Decrements the live worker count even if the worker panics.
struct LiveGuard(Arc<Shared>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut live = lock(&self.0.live_workers);
        *live = live.saturating_sub(1);
        drop(live);
        self.0.workers_done.notify_all();
    }
}

fn run_worker(shared: Arc<Shared>) {
    let _guard = LiveGuard(Arc::clone(&shared));
    let mut buffer: Vec<PendingRecord> = Vec::with_capacity(shared.buffer_capacity);

    loop {
        if shared.force_stop.load(Ordering::SeqCst) {
            break;
        }
        let room = shared.buffer_capacity.saturating_sub(buffer.len());
        let popped = shared.queue.pop_batch(room, shared.wait);
        if popped.is_empty() {
            if !buffer.is_empty() {
                shared.flush(&mut buffer);
            } else if shared.shutting_down.load(Ordering::SeqCst) {
                break;
            }
            continue;
        }
        buffer.extend(popped);
        if buffer.len() >= shared.buffer_capacity {
            shared.flush(&mut buffer);
        }
    }

    if !buffer.is_empty() {
        warn!(records = buffer.len(), "worker stopped with unflushed records, reserving");
        for pending in &buffer {
            shared.divert(pending);
        }
    }
}

/// Running worker pool plus the queue it drains.
pub struct Pipeline {
    shared: Arc<Shared>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Pipeline {
    /// Spawn the workers.
    pub fn start(
        dao: Arc<AuditDao>,
        reserve: ReserveChain,
        queue: &QueueConfig,
        reserve_config: &ReserveConfig,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: BoundedQueue::new(queue.capacity),
            dao,
            reserve: Mutex::new(reserve),
            stats: Mutex::new(PipelineStats::default()),
            shutting_down: AtomicBool::new(false),
            force_stop: AtomicBool::new(false),
            live_workers: Mutex::new(0),
            workers_done: Condvar::new(),
            buffer_capacity: queue.worker_buffer_capacity.max(1),
            wait: queue.wait(),
            max_generation: reserve_config.max_generation,
            requeue_on_failure: reserve_config.requeue_on_failure,
        });

        let pipeline = Pipeline {
            shared: Arc::clone(&shared),
            handles: Mutex::new(Vec::with_capacity(queue.workers)),
            stopped: AtomicBool::new(false),
        };

        for index in 0..queue.workers {
            *lock(&shared.live_workers) += 1;
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("audit-worker-{}", index))
                .spawn(move || run_worker(worker_shared));
            match spawned {
                Ok(handle) => lock(&pipeline.handles).push(handle),
                Err(e) => {
                    *lock(&shared.live_workers) -= 1;
                    return Err(Error::Io(e));
                }
            }
        }

        info!(
            workers = queue.workers,
            capacity = queue.capacity,
            buffer = shared.buffer_capacity,
            "audit pipeline started"
        );
        Ok(pipeline)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    pub fn stats(&self) -> PipelineStats {
        *lock(&self.shared.stats)
    }

    /// Enqueue records atomically.
    ///
    /// On failure the records are handed back so the caller keeps them.
    pub fn enqueue(
        &self,
        records: Vec<PendingRecord>,
    ) -> std::result::Result<(), (Vec<PendingRecord>, Error)> {
        if self.is_shutting_down() {
            return Err((records, Error::ShuttingDown));
        }
        let staged = records.len();
        self.shared
            .queue
            .try_push_all(records)
            .map_err(|(records, free)| (records, Error::QueueFull { staged, free }))?;
        debug!(records = staged, "enqueued audit records");
        Ok(())
    }

    /// Shut the pool down.
    ///
    /// New records are refused at once. Workers drain the queue for up to
    /// `wait_workers`; then they are told to stop and given `wait_executor`
    /// to exit. Whatever is still queued goes to the reserve chain, which is
    /// then closed. Returns whether every worker exited.
    pub fn stop(&self, wait_workers: Duration, wait_executor: Duration) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return *lock(&self.shared.live_workers) == 0;
        }

        info!(queued = self.queue_len(), "stopping audit pipeline");
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        self.shared.queue.wake_all();

        let mut finished = self.shared.wait_for_workers(wait_workers);
        if !finished {
            warn!(queued = self.queue_len(), "audit workers still busy, forcing stop");
            self.shared.force_stop.store(true, Ordering::SeqCst);
            self.shared.queue.wake_all();
            finished = self.shared.wait_for_workers(wait_executor);
        }

        let leftovers = self.shared.queue.drain_all();
        if !leftovers.is_empty() {
            warn!(records = leftovers.len(), "reserving records left in the queue");
            for pending in &leftovers {
                self.shared.divert(pending);
            }
        }

        lock(&self.shared.reserve).close();

        let handles = std::mem::take(&mut *lock(&self.handles));
        if finished {
            for handle in handles {
                if handle.join().is_err() {
                    error!("audit worker panicked");
                }
            }
        } else {
            error!(
                live = *lock(&self.shared.live_workers),
                "audit workers did not stop in time"
            );
        }

        let stats = self.stats();
        info!(
            stored = stats.stored,
            reserved = stats.reserved,
            dropped = stats.dropped,
            lost = stats.lost,
            finished,
            "audit pipeline stopped"
        );
        finished
    }
}

/// How long a pipeline dropped without `stop` lets its workers drain.
const DROP_DRAIN: Duration = Duration::from_secs(2);

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.stopped.load(Ordering::SeqCst) {
            self.stop(DROP_DRAIN, Duration::from_secs(1));
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("queued", &self.queue_len())
            .field("capacity", &self.capacity())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
