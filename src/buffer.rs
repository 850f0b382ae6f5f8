//! In-memory sample buffer between the capture producer and the sync consumer.
//!
//! The buffer is the single mutable resource shared by both sides. All
//! operations are synchronous and non-suspending so no sample can be lost
//! to a concurrent suspension point, and all of them are atomic with
//! respect to each other: a drain racing an append never loses or reorders
//! data relative to the drained batch.

use crate::types::{LocationSample, SampleBatch};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// FIFO queue of captured location samples, independent of network state.
///
/// Unbounded: growth policy (memory/storage pressure) is the host app's
/// concern. Samples leave the buffer only through [`drain`](Self::drain)
/// and come back only through [`requeue`](Self::requeue) after a failed
/// upload.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    inner: Mutex<VecDeque<LocationSample>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// A poisoned lock still holds valid sample data; recover it rather
    /// than dropping captures.
    fn lock(&self) -> MutexGuard<'_, VecDeque<LocationSample>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append one captured sample. Non-blocking, never fails, never drops.
    pub fn append(&self, sample: LocationSample) {
        self.lock().push_back(sample);
    }

    /// Atomically remove up to `max` of the oldest samples as one batch.
    /// Appends racing this call land after the drained range.
    pub fn drain(&self, max: usize) -> SampleBatch {
        let mut queue = self.lock();
        let take = max.min(queue.len());
        let samples: Vec<LocationSample> = queue.drain(..take).collect();
        SampleBatch { samples }
    }

    /// Reinsert a failed batch at the front, preserving global
    /// chronological order across retries.
    pub fn requeue(&self, batch: SampleBatch) {
        let mut queue = self.lock();
        for sample in batch.samples.into_iter().rev() {
            queue.push_front(sample);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
