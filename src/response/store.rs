//! Where the broker reads history it doesn't have in memory.
mod err;
mod memory;
mod pg;

pub use err::StoreErr;
pub use memory::MemoryStore;
pub use pg::PgPool;

use super::broker::Key;
use crate::event::{Message, MessageId, UserId};

use std::fmt;
use std::sync::Arc;

type Result<T> = std::result::Result<T, StoreErr>;

/// The persistence tier, as far as the broker is concerned.
///
/// Every method blocks; the broker calls them from the blocking worker pool through
/// [`run_blocking`], never while holding its own lock.
pub trait MessageStore: Send + Sync + fmt::Debug {
    /// The most recent `limit` message ids for `key`, newest first.
    fn recent_message_ids(&self, key: &Key, limit: usize) -> Result<Vec<MessageId>>;

    /// The bodies of whichever of `ids` exist, in any order.
    fn messages(&self, ids: &[MessageId]) -> Result<Vec<Message>>;

    /// The user's saved pointer, if they have one.
    fn pointer(&self, user: UserId) -> Result<Option<MessageId>>;
}

/// Run a store query on tokio's blocking pool.
pub async fn run_blocking<T, F>(store: Arc<dyn MessageStore>, query: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn MessageStore) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || query(&*store)).await?
}
