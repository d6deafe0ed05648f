//! Single-slot, merge-on-contention handoff of [`NetworkUpdate`]s
//!
//! A producer never waits for a slow consumer: if an update is already
//! waiting, the new one is folded into it with
//! [`NetworkUpdate::and_then`]. Any number of sends before a receive are
//! therefore observed as their merge, and nothing is ever dropped while the
//! mailbox is open.
//!
//! The simulation drains mailboxes with the non-blocking
//! [`Mailbox::try_receive`]; a connection's writer task awaits
//! [`Mailbox::receive`].

use crate::network::NetworkUpdate;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Option<NetworkUpdate>>,
    notify: Notify,
    closed: AtomicBool,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposits `update`, merging it after any update still waiting.
    ///
    /// Sends to a closed mailbox are discarded.
    pub fn send(&self, update: NetworkUpdate) {
        if self.is_closed() {
            return;
        }

        {
            let mut slot = self.slot.lock();
            match slot.as_mut() {
                Some(pending) => pending.and_then(update),
                None => *slot = Some(update),
            }
        }
        self.notify.notify_one();
    }

    /// Takes the waiting update, if any, without blocking.
    pub fn try_receive(&self) -> Option<NetworkUpdate> {
        self.slot.lock().take()
    }

    /// Waits for an update. Returns `None` once the mailbox is closed and
    /// drained.
    pub async fn receive(&self) -> Option<NetworkUpdate> {
        loop {
            if let Some(update) = self.try_receive() {
                return Some(update);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Stops accepting updates and wakes a waiting receiver.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// True when an update is waiting.
    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }
}
