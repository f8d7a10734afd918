use super::{MessageStore, Result, StoreErr};
use crate::event::{Message, MessageId, RealmId, UserId};
use crate::response::broker::Key;

use hashbrown::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// A `MessageStore` that lives entirely in memory, for tests and benchmarks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    history_queries: AtomicUsize,
}

#[derive(Debug, Default)]
struct Inner {
    messages: HashMap<MessageId, Message>,
    history: HashMap<Key, Vec<MessageId>>,
    pointers: HashMap<UserId, MessageId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed message as received by `users` (and sent to `stream`).
    pub fn insert(&self, message: Message, users: &[UserId], stream: Option<(RealmId, &str)>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let keys = users
            .iter()
            .map(|user| Key::User(*user))
            .chain(stream.map(|(realm, name)| Key::stream(realm, name)));
        for key in keys.collect::<Vec<_>>() {
            inner.history.entry(key).or_default().push(message.id);
        }
        inner.messages.insert(message.id, message);
    }

    pub fn set_pointer(&self, user: UserId, pointer: MessageId) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pointers
            .insert(user, pointer);
    }

    /// Make every query fail until called again with `false`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// How many `recent_message_ids` queries have been answered.
    pub fn history_queries(&self) -> usize {
        self.history_queries.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreErr::Unavailable("store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl MessageStore for MemoryStore {
    fn recent_message_ids(&self, key: &Key, limit: usize) -> Result<Vec<MessageId>> {
        self.check_available()?;
        self.history_queries.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids = inner.history.get(key).cloned().unwrap_or_default();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.truncate(limit);
        Ok(ids)
    }

    fn messages(&self, ids: &[MessageId]) -> Result<Vec<Message>> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(ids
            .iter()
            .filter_map(|id| inner.messages.get(id).cloned())
            .collect())
    }

    fn pointer(&self, user: UserId) -> Result<Option<MessageId>> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.pointers.get(&user).copied())
    }
}
