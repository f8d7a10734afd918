use super::{ClientId, Key};
use crate::event::MessageId;
use crate::response::store::StoreErr;

use std::fmt;

#[derive(Debug)]
pub enum BrokerErr {
    /// The client's cursor predates everything buffered for `key`.
    StaleCursor { key: Key, min_last: MessageId },
    BadQueueId(String),
    QueueOwner(ClientId),
    Store(StoreErr),
}

impl BrokerErr {
    /// Whether the client may simply retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl std::error::Error for BrokerErr {}

impl fmt::Display for BrokerErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use BrokerErr::*;
        match self {
            StaleCursor { key, min_last } => write!(
                f,
                "`last` is older than the messages buffered for {}; the oldest valid value \
                 is {}.  Reload all messages instead of polling incrementally.",
                key, min_last
            ),
            BadQueueId(id) => write!(f, "bad event queue id: {}", id),
            QueueOwner(id) => write!(f, "event queue {} belongs to another user", id),
            Store(inner) => write!(f, "{}", inner),
        }
    }
}

impl From<StoreErr> for BrokerErr {
    fn from(e: StoreErr) -> Self {
        Self::Store(e)
    }
}
