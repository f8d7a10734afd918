//! Owns every in-memory table the broker keeps: client descriptors and their queues,
//! parked-request callbacks, recent message ids, pointers, and recently seen message
//! bodies.  Ingested notices are applied here and fanned out to whoever is waiting.
mod callbacks;
mod client;
mod err;
mod event_queue;
mod handler;
mod id;
mod key;
mod mtables;

pub use callbacks::{Callbacks, Category};
pub use client::{ClientDescriptor, ClientKind, ClientRegistry, Parking};
pub use err::BrokerErr;
pub use event_queue::EventQueue;
pub use handler::{Handler, Wake};
pub use id::{ClientId, ServerGeneration};
pub use key::Key;
pub use mtables::MTables;

use super::store::MessageStore;
use crate::config;
use crate::event::{EventKind, EventType, Message, MessageId, MessageRef, Notice, UserId};

use hashbrown::HashMap;
use lru::LruCache;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub type SharedBroker = Arc<Mutex<Broker>>;

#[derive(Debug)]
pub struct Broker {
    pub clients: ClientRegistry,
    pub callbacks: Callbacks,
    pub mtables: MTables,
    pointers: HashMap<UserId, MessageId>,
    messages: LruCache<MessageId, Arc<Message>>,
    store: Arc<dyn MessageStore>,
    queue_timeout: Duration,
}

impl Broker {
    pub fn new(
        cfg: &config::Broker,
        generation: ServerGeneration,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            clients: ClientRegistry::new(generation),
            callbacks: Callbacks::new(),
            mtables: MTables::new(*cfg.mtable_size),
            pointers: HashMap::new(),
            messages: LruCache::new(*cfg.message_cache_size),
            store,
            queue_timeout: *cfg.queue_timeout,
        }
    }

    pub fn into_arc(self) -> SharedBroker {
        Arc::new(Mutex::new(self))
    }

    pub fn recover(poisoned: PoisonError<MutexGuard<Self>>) -> MutexGuard<Self> {
        log::error!("{}", &poisoned);
        poisoned.into_inner()
    }

    pub fn generation(&self) -> ServerGeneration {
        self.clients.generation()
    }

    pub fn store(&self) -> Arc<dyn MessageStore> {
        self.store.clone()
    }

    /// Apply a notice from the persistence tier and wake everyone waiting on it.
    pub fn ingest(&mut self, notice: Notice) {
        match notice {
            Notice::NewMessage {
                message,
                users,
                realm_id,
                stream_name,
            } => {
                let id = message.id();
                let body = match message {
                    MessageRef::Full(msg) => Some(self.cache_message(*msg)),
                    MessageRef::Id(id) => self.cached_message(id),
                };
                log::info!("New message {} for {} user(s)", id, users.len());

                for user in users {
                    let key = Key::User(user);
                    self.mtables.add_id(&key, id);
                    self.clients.for_user_mut(user, |client| {
                        if client.accepts(EventType::Message) {
                            let message = match &body {
                                Some(body) => body.to_client_json(client.apply_markdown),
                                None => Message::bare(id).to_client_json(client.apply_markdown),
                            };
                            client.push_event(EventKind::Message { message });
                        }
                    });
                    self.callbacks
                        .call(&key, Category::UserReceive, Wake::NewMessage(id));
                }

                if let Some(name) = stream_name {
                    let key = Key::stream(realm_id.unwrap_or_default(), &name);
                    self.mtables.add_id(&key, id);
                    self.callbacks
                        .call(&key, Category::StreamReceive, Wake::NewMessage(id));
                }
            }
            Notice::PointerUpdate { user, new_pointer } => {
                log::info!("Pointer for user {} moved to {}", user, new_pointer);
                self.pointers.insert(user, new_pointer);
                self.clients.for_user_mut(user, |client| {
                    client.push_event(EventKind::Pointer {
                        pointer: new_pointer,
                    });
                });
                self.callbacks.call(
                    &Key::User(user),
                    Category::PointerUpdate,
                    Wake::Pointer(new_pointer),
                );
            }
            Notice::Subscription {
                user,
                op,
                stream_name,
            } => {
                log::info!("User {} subscription {:?} {}", user, op, stream_name);
                self.clients.for_user_mut(user, |client| {
                    client.push_event(EventKind::Subscription {
                        op,
                        stream_name: stream_name.clone(),
                    });
                });
            }
        }
    }

    pub fn cache_message(&mut self, message: Message) -> Arc<Message> {
        let message = Arc::new(message);
        self.messages.put(message.id, message.clone());
        message
    }

    pub fn cached_message(&mut self, id: MessageId) -> Option<Arc<Message>> {
        self.messages.get(&id).cloned()
    }

    /// The server-side pointer for `user`, or `None` if it hasn't been loaded yet.
    pub fn pointer(&self, user: UserId) -> Option<MessageId> {
        self.pointers.get(&user).copied()
    }

    /// Install a pointer loaded from the store, unless ingest got there first.
    pub fn load_pointer(&mut self, user: UserId, pointer: MessageId) -> MessageId {
        *self.pointers.entry(user).or_insert(pointer)
    }

    /// One pass of the idle queue collector.  Returns the number of clients reclaimed.
    pub fn collect_idle(&mut self, now: Instant) -> usize {
        let reclaimed = self.clients.sweep(now, self.queue_timeout);
        let pruned = self.callbacks.prune_closed();
        log::info!(
            "Idle queue sweep: reclaimed {} client(s), dropped {} closed callback(s), {} client(s) remain",
            reclaimed.len(),
            pruned,
            self.clients.len()
        );
        reclaimed.len()
    }

    pub fn pending(&self, key: &Key, category: Category) -> usize {
        self.callbacks.pending(key, category)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn count(&self) -> String {
        format!(
            "Current clients: {}\nParked callbacks: {}\nBuffered keys: {}",
            self.clients.len(),
            self.callbacks.total_pending(),
            self.mtables.len()
        )
    }
}

/// Run the idle queue collector every `period`, forever.
pub async fn collect_idle_queues(broker: SharedBroker, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // the first tick completes immediately
    loop {
        interval.tick().await;
        broker
            .lock()
            .unwrap_or_else(Broker::recover)
            .collect_idle(Instant::now());
    }
}
