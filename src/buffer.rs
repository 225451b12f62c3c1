//! Bounded FIFO buffer shared by all partition workers.
//!
//! Many producers (one per partition) block on [`RecordBuffer::offer`] while
//! the single consumer drains through [`RecordBuffer::drain`]. Capacity is
//! tracked with a pair of semaphores so waiting never holds the queue lock.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::record::{OrderedRecord, StreamPartition};

pub(crate) struct RecordBuffer {
    capacity: usize,
    queue: Mutex<VecDeque<OrderedRecord>>,
    /// Permits for free slots; `offer` takes one per stored record.
    space: Semaphore,
    /// Permits for stored records; `drain` takes one per removed record.
    items: Semaphore,
}

impl RecordBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            space: Semaphore::new(capacity),
            items: Semaphore::new(0),
        }
    }

    /// Appends `record`, waiting up to `timeout` for a free slot. Returns
    /// whether the record was accepted.
    ///
    /// Cancel safe: a caller dropped while waiting has neither consumed a
    /// slot nor stored the record.
    pub async fn offer(&self, record: OrderedRecord, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.space.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                self.queue.lock().push_back(record);
                self.items.add_permits(1);
                true
            }
            // acquire() only fails if the semaphore is closed, which we never do
            _ => false,
        }
    }

    /// Removes up to `max` records into `out`, waiting at most `timeout` for
    /// the first one. Returns the number of records moved.
    pub async fn drain(&self, out: &mut Vec<OrderedRecord>, max: usize, timeout: Duration) -> usize {
        if max == 0 {
            return 0;
        }

        match tokio::time::timeout(timeout, self.items.acquire()).await {
            Ok(Ok(permit)) => permit.forget(),
            _ => return 0,
        }

        let mut drained = 0;
        loop {
            let record = self
                .queue
                .lock()
                .pop_front()
                .expect("items permit held without a queued record");
            self.space.add_permits(1);
            out.push(record);
            drained += 1;

            if drained >= max {
                break;
            }
            match self.items.try_acquire() {
                Ok(permit) => permit.forget(),
                Err(_) => break,
            }
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.len()
    }

    /// Builds a fresh buffer of the same capacity containing, in order,
    /// exactly the records whose partition is not in `partitions`.
    ///
    /// Must only be called while no producer or consumer is active (the
    /// reseek protocol's scheduler fence guarantees this).
    pub fn rebuild_excluding(
        &self,
        partitions: &std::collections::HashSet<StreamPartition>,
    ) -> RecordBuffer {
        let kept: VecDeque<OrderedRecord> = self
            .queue
            .lock()
            .drain(..)
            .filter(|record| !partitions.contains(record.stream_partition()))
            .collect();

        RecordBuffer {
            capacity: self.capacity,
            space: Semaphore::new(self.capacity - kept.len()),
            items: Semaphore::new(kept.len()),
            queue: Mutex::new(kept),
        }
    }
}
