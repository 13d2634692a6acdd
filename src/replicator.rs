//! # Process-wide fan-out of OS signals to registered subscribers.
//!
//! [`SignalReplicator`] delivers every signal pushed through [`send`](SignalReplicator::send)
//! to all inboxes registered at the time of delivery. Subscribers are the
//! per-process signal inboxes owned by [`Process`](crate::Process); signals
//! come from the OS capture loop and from the supervisor's tumble
//! re-injection.
//!
//! ## Architecture
//! ```text
//! os_signals ──┐
//!              ├──► input queue ──► listener task ──► inbox 1 (cap 1)
//! tumble ──────┘                          ├─────────► inbox 2 (cap 1)
//!                                         └─────────► inbox N (cap 1)
//! ```
//!
//! ## Rules
//! - [`send`](SignalReplicator::send) is enqueue-only and safe from any task.
//! - Delivery to each inbox is blocking: inboxes have capacity 1 and their
//!   consumers drain promptly. A stuck consumer stalls fan-out, which is the
//!   supervisor's problem to resolve, not the replicator's.
//! - Subscribers are identified by an opaque [`SubscriberId`];
//!   [`remove`](SignalReplicator::remove) is idempotent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use nix::sys::signal::Signal;
use tokio::sync::mpsc;

/// Opaque handle identifying one registered signal inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Cloneable handle to the replicator. All clones share the same subscriber
/// set and input queue.
#[derive(Clone)]
pub struct SignalReplicator {
    inner: Arc<Inner>,
}

struct Inner {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Signal>>>,
    input: mpsc::UnboundedSender<Signal>,
    next_id: AtomicU64,
}

impl SignalReplicator {
    /// Creates the replicator and spawns its listener task.
    ///
    /// The listener lives for the rest of the program; it only stops when
    /// every handle has been dropped.
    pub fn new() -> Self {
        let (input, mut rx) = mpsc::unbounded_channel::<Signal>();
        let inner = Arc::new(Inner {
            subscribers: Mutex::new(HashMap::new()),
            input,
            next_id: AtomicU64::new(1),
        });

        let listener = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(sig) = rx.recv().await {
                // Senders are cloned out so the map lock is never held
                // across an await point.
                let targets: Vec<mpsc::Sender<Signal>> = listener
                    .subscribers
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .values()
                    .cloned()
                    .collect();
                for inbox in targets {
                    let _ = inbox.send(sig).await;
                }
            }
        });

        Self { inner }
    }

    /// Registers an inbox and returns its id.
    pub fn register(&self, inbox: mpsc::Sender<Signal>) -> SubscriberId {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, inbox);
        id
    }

    /// Removes a previously registered inbox. Removing an unknown or
    /// already-removed id is a no-op.
    pub fn remove(&self, id: SubscriberId) {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    /// Queues a signal for replication to every registered inbox.
    pub fn send(&self, sig: Signal) {
        let _ = self.inner.input.send(sig);
    }

    /// Number of currently registered inboxes.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for SignalReplicator {
    fn default() -> Self {
        Self::new()
    }
}
