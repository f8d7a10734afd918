//! Everything between an accepted request and its reply: the broker's in-memory
//! state, the long-poll protocol on top of it, and the store it falls back to.
pub mod broker;
pub mod long_poll;
pub mod store;

pub use broker::{Broker, BrokerErr, SharedBroker};
pub use long_poll::{ClientOptions, Events, IngestGate, Registration, UpdateType, Updates};
pub use store::{MemoryStore, MessageStore, PgPool, StoreErr};
