//! Pending queue of work items not yet handed to the executor.
//!
//! Unbounded: if no executor ever polls, items accumulate until their
//! submitters time out and remove them.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::work::WorkItem;

#[derive(Debug, Default)]
pub struct PendingQueue {
    items: Mutex<VecDeque<WorkItem>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // Queue operations never panic while holding the lock, so a poisoned
    // mutex still guards a consistent deque.
    fn lock(&self) -> MutexGuard<'_, VecDeque<WorkItem>> {
        self.items.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Pending queue mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn enqueue(&self, item: WorkItem) {
        self.lock().push_back(item);
    }

    /// Pop the head of the queue without waiting.
    pub fn try_dequeue(&self) -> Option<WorkItem> {
        self.lock().pop_front()
    }

    /// Remove the first item with `id`. Returns false if it was already popped.
    pub fn remove(&self, id: &str) -> bool {
        let mut items = self.lock();
        match items.iter().position(|item| item.id == id) {
            Some(index) => items.remove(index).is_some(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
