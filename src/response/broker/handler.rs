use crate::event::MessageId;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

/// Why a parked long-poll was woken.
#[derive(Debug, Clone, PartialEq)]
pub enum Wake {
    NewMessage(MessageId),
    Pointer(MessageId),
    QueueEvent,
    /// A newer poll from the same client took over.
    Superseded,
}

/// The broker's handle on one parked long-poll request.
///
/// Clones share a single one-shot slot: the request can be registered under several
/// keys, and whichever fires first wakes it.  Later fires find the slot empty.
#[derive(Clone)]
pub struct Handler {
    slot: Arc<Mutex<Option<oneshot::Sender<Wake>>>>,
}

impl Handler {
    /// A new handle plus the receiver the parked request waits on.
    pub fn new() -> (Self, oneshot::Receiver<Wake>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Wake the request.  Returns `false` if it was already woken or has gone away;
    /// neither is an error.
    pub fn fire(&self, wake: Wake) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => tx.send(wake).is_ok(),
            None => false,
        }
    }

    /// Whether a request is still waiting on the other end.
    pub fn is_alive(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |tx| !tx.is_closed())
    }

    pub fn same_request(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler {{ alive: {} }}", self.is_alive())
    }
}
