// SPDX-License-Identifier: Apache-2.0
//! Bulkhead: a hard bound on concurrent in-flight calls to one target.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl Bulkhead {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Acquire a slot, rejecting immediately when the bulkhead is full.
    ///
    /// The returned permit releases the slot when dropped, which covers
    /// every exit path: success, failure, timeout, and cancellation.
    pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit, BulkheadFull> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| BulkheadFull {
                max_concurrent: self.max_concurrent,
            })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Slots currently free (for logging and tests).
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[derive(Debug)]
pub struct BulkheadFull {
    pub max_concurrent: usize,
}
