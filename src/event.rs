//! Types for what flows through the broker: ids, message bodies, the notices the
//! persistence tier sends on ingest, and the events buffered for each client.
mod err;
mod id;
mod message;
mod notice;

pub use err::EventErr;
pub use id::{MessageId, RealmId, UserId};
pub use message::Message;
pub use notice::{MessageRef, Notice, SubscriptionOp};

use serde::Serialize;
use serde_json::Value;
use strum::{EnumString, VariantNames};

/// One entry in a client's `EventQueue`.
///
/// The `id` is assigned by the queue on `push` and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: i64,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Message { message: Value },
    Pointer { pointer: MessageId },
    Subscription { op: SubscriptionOp, stream_name: String },
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Message { .. } => EventType::Message,
            Self::Pointer { .. } => EventType::Pointer,
            Self::Subscription { .. } => EventType::Subscription,
        }
    }
}

/// The categories of event a registered queue can opt into.
#[derive(EnumString, VariantNames, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Message,
    Pointer,
    Subscription,
}

impl EventType {
    /// Parse a comma-separated list such as `"message,pointer"`.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, EventErr> {
        use std::str::FromStr;
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Self::from_str(s).map_err(|_| {
                    EventErr::UnknownEventType(s.to_string(), format!("{:?}", Self::VARIANTS))
                })
            })
            .collect()
    }
}
