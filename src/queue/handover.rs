//! Single-slot handover between an enqueuer and a waiting dequeuer
//!
//! When the queue was empty and a dequeuer is blocked, an enqueuer hands
//! the decoded item over once it is durable (data frame, WAL record and
//! commit). The dequeuer then claims the matching index entry instead of
//! reading the item back from the data file. A handoff whose entry was
//! already taken by a regular dequeue is dropped.

use crate::item::Item;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// An item already recorded in the index under `host` and its own ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub host: String,
    pub item: Item,
}

#[derive(Debug, Default)]
pub struct Handover {
    slot: Mutex<Option<Handoff>>,
    waiting: AtomicUsize,
}

impl Handover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_waiters(&self) -> bool {
        self.waiting.load(Ordering::Acquire) > 0
    }

    /// Places a handoff in the slot if a dequeuer is waiting and the slot is free
    ///
    /// Returns false when the handover is not possible.
    pub fn offer(&self, handoff: Handoff) -> bool {
        if !self.has_waiters() {
            return false;
        }
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_some() {
            return false;
        }
        *slot = Some(handoff);
        true
    }

    pub fn take(&self) -> Option<Handoff> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    pub fn is_occupied(&self) -> bool {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    /// Registers a waiting dequeuer for the lifetime of the guard
    pub fn waiter(&self) -> WaiterGuard<'_> {
        self.waiting.fetch_add(1, Ordering::AcqRel);
        WaiterGuard { handover: self }
    }
}

pub struct WaiterGuard<'a> {
    handover: &'a Handover,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.handover.waiting.fetch_sub(1, Ordering::AcqRel);
    }
}
