//! Bounded FIFO shared by committers and workers.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Fixed-capacity queue. Pushing never blocks; popping may wait.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        BoundedQueue {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            capacity,
        }
    }

    // Queue operations never panic while holding the lock
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Free slots right now.
    pub fn free(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    /// Append all items or none.
    ///
    /// When they do not fit the items are handed back untouched, together
    /// with the number of free slots at the time of the check.
    pub fn try_push_all(&self, items: Vec<T>) -> Result<(), (Vec<T>, usize)> {
        let mut queue = self.lock();
        let free = self.capacity.saturating_sub(queue.len());
        if items.len() > free {
            return Err((items, free));
        }
        queue.extend(items);
        drop(queue);
        self.available.notify_all();
        Ok(())
    }

    /// Append one item if there is room.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            return Err(item);
        }
        queue.push_back(item);
        drop(queue);
        self.available.notify_one();
        Ok(())
    }

    /// Take up to `max` items, waiting up to `wait` if the queue is empty.
    pub fn pop_batch(&self, max: usize, wait: Duration) -> Vec<T> {
        let queue = self.lock();
        let (mut queue, _) = self
            .available
            .wait_timeout_while(queue, wait, |q| q.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        let take = max.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Remove everything.
    pub fn drain_all(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    /// Wake every waiting consumer.
    pub fn wake_all(&self) {
        self.available.notify_all();
    }
}
