//! The long-poll protocol: answer a client right away when there's something to tell
//! it, otherwise park the request on the broker until ingest wakes it.
//!
//! Two flavors share the same machinery:
//! * `get_updates` waits on a user's (or a stream's) message ids and pointer, with the
//!   client supplying its own cursor;
//! * `get_events` drains a registered client's `EventQueue`.
#[cfg(test)]
mod test;

use super::broker::{
    Broker, BrokerErr, Category, ClientId, ClientKind, Handler, Key, Parking, ServerGeneration,
    SharedBroker, Wake,
};
use super::store::run_blocking;
use crate::event::{Event, EventType, Message, MessageId, MessageRef, Notice, UserId};
use crate::request::{EventsQuery, Identity, UpdatesQuery};

use hashbrown::HashSet;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;

type Result<T> = std::result::Result<T, BrokerErr>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    NewMessages,
    PointerUpdate,
    ClientReload,
    NonblockingRequest,
}

/// The reply to `get_updates`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Updates {
    pub result: &'static str,
    pub messages: Vec<Value>,
    pub update_types: Vec<UpdateType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_pointer: Option<MessageId>,
    pub server_generation: ServerGeneration,
    pub queue_id: ClientId,
}

/// The reply to `get_events`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Events {
    pub result: &'static str,
    pub events: Vec<Event>,
    pub queue_id: ClientId,
}

/// The reply to `register`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub result: &'static str,
    pub queue_id: ClientId,
    pub last_event_id: i64,
    pub server_generation: ServerGeneration,
}

/// How a newly registered client wants its events.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub apply_markdown: bool,
    pub event_types: Option<Vec<EventType>>,
    pub client_name: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            apply_markdown: true,
            event_types: None,
            client_name: None,
        }
    }
}

/// Serializes ingest, so notices are applied in arrival order even while one of them
/// waits on the store for a message body.
#[derive(Debug, Clone, Default)]
pub struct IngestGate(Arc<tokio::sync::Mutex<()>>);

/// Apply a notice from the persistence tier.  The body of a message that arrives as a
/// bare id is fetched first, so registered queues get the full message; if that fails
/// the message is delivered by id alone.
pub async fn ingest(broker: &SharedBroker, gate: &IngestGate, notice: Notice) {
    let _turn = gate.0.lock().await;
    let missing = match &notice {
        Notice::NewMessage {
            message: MessageRef::Id(id),
            ..
        } => {
            let mut locked = broker.lock().unwrap_or_else(Broker::recover);
            match locked.cached_message(*id) {
                Some(_) => None,
                None => Some((*id, locked.store())),
            }
        }
        _ => None,
    };
    if let Some((id, store)) = missing {
        match run_blocking(store, move |store| store.messages(&[id])).await {
            Ok(found) => {
                let mut locked = broker.lock().unwrap_or_else(Broker::recover);
                for message in found {
                    locked.cache_message(message);
                }
            }
            Err(e) => log::error!("Could not load message {} at ingest: {}", id, e),
        }
    }
    broker
        .lock()
        .unwrap_or_else(Broker::recover)
        .ingest(notice);
}

/// Allocate a client descriptor and its event queue.
pub fn register(broker: &SharedBroker, who: Identity, options: ClientOptions) -> Registration {
    let mut broker = broker.lock().unwrap_or_else(Broker::recover);
    let generation = broker.generation();
    let client = broker
        .clients
        .allocate(who.user_id, who.realm_id, options.apply_markdown, Instant::now());
    client.event_types = options
        .event_types
        .map(|types| types.into_iter().collect::<HashSet<_>>());
    client.client_name = options.client_name;
    Registration {
        result: "success",
        queue_id: client.id(),
        last_event_id: -1,
        server_generation: generation,
    }
}

/// What a `get_updates` pass decided, made while holding the broker lock.
enum Step {
    LoadPointer,
    LoadHistory,
    Respond {
        update_types: Vec<UpdateType>,
        new_pointer: Option<MessageId>,
        ids: Vec<MessageId>,
    },
    Park {
        handler: Handler,
        rx: oneshot::Receiver<Wake>,
    },
}

/// A `get_updates` request after its client has been resolved.
struct Poll {
    who: Identity,
    client: ClientId,
    generation: ServerGeneration,
    key: Key,
    category: Category,
    apply_markdown: bool,
    mirror: Option<String>,
    client_pointer: Option<MessageId>,
    client_server_generation: Option<u64>,
    dont_block: bool,
}

impl Poll {
    fn updates(&self, update_types: Vec<UpdateType>, messages: &[Arc<Message>]) -> Updates {
        Updates {
            result: "success",
            messages: messages
                .iter()
                .map(|msg| msg.to_client_json(self.apply_markdown))
                .collect(),
            update_types,
            new_pointer: None,
            server_generation: self.generation,
            queue_id: self.client,
        }
    }

    fn nothing(&self) -> Updates {
        self.updates(Vec::new(), &[])
    }

    fn is_echo(&self, message: &Message) -> bool {
        self.mirror
            .as_deref()
            .map_or(false, |name| message.sent_by_client(name))
    }

    /// Decide between answering now and parking, given the client's cursor.
    fn plan(&self, broker: &mut Broker, last: Option<MessageId>) -> Result<Step> {
        let mut update_types = Vec::new();
        let mut new_pointer = None;
        let mut ids = Vec::new();

        let reload = self
            .client_server_generation
            .map_or(false, |theirs| theirs != self.generation.0);
        if reload {
            update_types.push(UpdateType::ClientReload);
        }
        if self.dont_block {
            update_types.push(UpdateType::NonblockingRequest);
        }
        if let Some(client_pointer) = self.client_pointer {
            match broker.pointer(self.who.user_id) {
                None => return Ok(Step::LoadPointer),
                Some(pointer) if pointer > client_pointer => {
                    update_types.push(UpdateType::PointerUpdate);
                    new_pointer = Some(pointer);
                }
                Some(_) => (),
            }
        }
        if let Some(last) = last {
            match broker.mtables.fetch(&self.key, last) {
                Ok(None) => return Ok(Step::LoadHistory),
                Ok(Some(newer)) if !newer.is_empty() => {
                    update_types.push(UpdateType::NewMessages);
                    ids = newer;
                }
                Ok(Some(_)) => (),
                // a reloading client throws its cursor away anyway
                Err(BrokerErr::StaleCursor { .. }) if reload => (),
                Err(e) => return Err(e),
            }
        }
        if !update_types.is_empty() {
            return Ok(Step::Respond {
                update_types,
                new_pointer,
                ids,
            });
        }

        let (handler, rx) = Handler::new();
        if let Some(client) = broker.clients.get_mut(&self.client) {
            client.connect(handler.clone(), Parking::Updates, Instant::now());
        }
        broker
            .callbacks
            .add(self.key.clone(), self.category, handler.clone());
        if self.client_pointer.is_some() {
            broker.callbacks.add(
                Key::User(self.who.user_id),
                Category::PointerUpdate,
                handler.clone(),
            );
        }
        Ok(Step::Park { handler, rx })
    }
}

/// Find the client named by `queue_id`, else the user's polling client, allocating
/// one on the user's first poll.
fn attach_client(broker: &mut Broker, who: Identity, q: &UpdatesQuery) -> ClientId {
    let now = Instant::now();
    let named = q
        .queue_id
        .as_deref()
        .and_then(|raw| broker.clients.resolve(raw).ok())
        .filter(|id| {
            broker
                .clients
                .get(id)
                .map_or(false, |client| client.user_id == who.user_id)
        });
    let existing = named.or_else(|| {
        broker
            .clients
            .polling_client(who.user_id, q.mirror.as_deref(), q.apply_markdown)
    });
    let id = match existing {
        Some(id) => id,
        None => {
            let client = broker
                .clients
                .allocate(who.user_id, who.realm_id, q.apply_markdown, now);
            client.kind = ClientKind::Polling;
            // message updates arrive through callbacks, not the event queue
            client.event_types = Some(HashSet::new());
            client.client_name = q.mirror.clone();
            client.id()
        }
    };
    if let Some(client) = broker.clients.get_mut(&id) {
        client.touch(now);
    }
    id
}

/// Answer a `get_updates` long-poll.
pub async fn get_updates(broker: SharedBroker, who: Identity, q: UpdatesQuery) -> Result<Updates> {
    let poll = {
        let mut locked = broker.lock().unwrap_or_else(Broker::recover);
        let client = attach_client(&mut locked, who, &q);
        let (key, category) = match &q.stream_name {
            Some(name) => (Key::stream(who.realm_id, name), Category::StreamReceive),
            None => (Key::User(who.user_id), Category::UserReceive),
        };
        let descriptor = locked.clients.get(&client);
        Poll {
            who,
            client,
            generation: locked.generation(),
            key,
            category,
            apply_markdown: descriptor.map_or(q.apply_markdown, |c| c.apply_markdown),
            mirror: descriptor.and_then(|c| c.client_name.clone()),
            client_pointer: q.client_pointer,
            client_server_generation: q.client_server_generation,
            dont_block: q.dont_block,
        }
    };
    let mut last = q.last;

    loop {
        let step = {
            let mut locked = broker.lock().unwrap_or_else(Broker::recover);
            poll.plan(&mut locked, last)?
        };
        match step {
            Step::LoadPointer => load_pointer(&broker, poll.who.user_id).await?,
            Step::LoadHistory => load_history(&broker, &poll.key).await?,
            Step::Respond {
                mut update_types,
                new_pointer,
                ids,
            } => {
                let mut messages = load_messages(&broker, &ids).await?;
                messages.retain(|msg| !poll.is_echo(msg));
                if !ids.is_empty() && messages.is_empty() {
                    update_types.retain(|t| *t != UpdateType::NewMessages);
                    if update_types.is_empty() {
                        // everything new was the client's own echo; keep waiting past it
                        last = ids.last().copied();
                        continue;
                    }
                }
                return Ok(Updates {
                    new_pointer,
                    ..poll.updates(update_types, &messages)
                });
            }
            Step::Park { handler, rx } => {
                let _parked = Parked::new(&broker, poll.client, handler);
                log::info!("Parked client {} on {}", poll.client, poll.key);
                match rx.await.unwrap_or(Wake::Superseded) {
                    Wake::NewMessage(id) if last.map_or(false, |last| id <= last) => {
                        return Ok(poll.nothing())
                    }
                    Wake::NewMessage(id) => {
                        let messages = load_messages(&broker, &[id]).await?;
                        if messages.iter().any(|msg| poll.is_echo(msg)) {
                            last = Some(id);
                            continue;
                        }
                        return Ok(poll.updates(vec![UpdateType::NewMessages], &messages));
                    }
                    Wake::Pointer(pointer)
                        if poll.client_pointer.map_or(true, |theirs| pointer > theirs) =>
                    {
                        return Ok(Updates {
                            new_pointer: Some(pointer),
                            ..poll.updates(vec![UpdateType::PointerUpdate], &[])
                        });
                    }
                    Wake::Pointer(_) | Wake::QueueEvent | Wake::Superseded => {
                        return Ok(poll.nothing())
                    }
                }
            }
        }
    }
}

/// Answer a `get_events` long-poll on a registered queue.
pub async fn get_events(broker: SharedBroker, who: Identity, q: EventsQuery) -> Result<Events> {
    let (client, handler, rx) = {
        let mut locked = broker.lock().unwrap_or_else(Broker::recover);
        let id = locked.clients.resolve(&q.queue_id)?;
        let client = locked
            .clients
            .get_mut(&id)
            .ok_or_else(|| BrokerErr::BadQueueId(q.queue_id.clone()))?;
        if client.user_id != who.user_id {
            return Err(BrokerErr::QueueOwner(id));
        }
        let now = Instant::now();
        if let Some(last_event_id) = q.last_event_id {
            client.event_queue_mut().prune(last_event_id);
        }
        client.touch(now);
        if !client.event_queue().is_empty() || q.dont_block {
            return Ok(Events {
                result: "success",
                events: client.event_queue().contents(),
                queue_id: id,
            });
        }
        let (handler, rx) = Handler::new();
        client.connect(handler.clone(), Parking::Events, now);
        (id, handler, rx)
    };

    let _parked = Parked::new(&broker, client, handler);
    log::info!("Parked client {} on its event queue", client);
    let _wake = rx.await;
    let events = {
        let locked = broker.lock().unwrap_or_else(Broker::recover);
        locked
            .clients
            .get(&client)
            .map(|c| c.event_queue().contents())
            .ok_or_else(|| BrokerErr::BadQueueId(client.to_string()))?
    };
    Ok(Events {
        result: "success",
        events,
        queue_id: client,
    })
}

/// Keeps a parked request attached to its client; detaches it when the request
/// finishes or its connection is dropped.
struct Parked {
    broker: SharedBroker,
    client: ClientId,
    handler: Handler,
}

impl Parked {
    fn new(broker: &SharedBroker, client: ClientId, handler: Handler) -> Self {
        Self {
            broker: broker.clone(),
            client,
            handler,
        }
    }
}

impl Drop for Parked {
    fn drop(&mut self) {
        let mut broker = self.broker.lock().unwrap_or_else(Broker::recover);
        if let Some(client) = broker.clients.get_mut(&self.client) {
            client.disconnect(&self.handler, Instant::now());
        }
    }
}

async fn load_pointer(broker: &SharedBroker, user: UserId) -> Result<()> {
    let store = broker.lock().unwrap_or_else(Broker::recover).store();
    let pointer = run_blocking(store, move |store| store.pointer(user)).await?;
    broker
        .lock()
        .unwrap_or_else(Broker::recover)
        .load_pointer(user, pointer.unwrap_or(-1));
    Ok(())
}

async fn load_history(broker: &SharedBroker, key: &Key) -> Result<()> {
    let (store, limit) = {
        let locked = broker.lock().unwrap_or_else(Broker::recover);
        (locked.store(), locked.mtables.capacity())
    };
    let query_key = key.clone();
    let ids = run_blocking(store, move |store| store.recent_message_ids(&query_key, limit))
        .await
        .map_err(|e| {
            log::error!("Could not backfill {}: {}", key, e);
            e
        })?;
    log::info!("Backfilled {} id(s) for {}", ids.len(), key);
    broker
        .lock()
        .unwrap_or_else(Broker::recover)
        .mtables
        .backfill(key, ids);
    Ok(())
}

/// Message bodies for `ids`, oldest first, from the cache where possible.  An id the
/// store doesn't know still gets delivered, with an empty body.
async fn load_messages(broker: &SharedBroker, ids: &[MessageId]) -> Result<Vec<Arc<Message>>> {
    let (mut found, missing, store) = {
        let mut locked = broker.lock().unwrap_or_else(Broker::recover);
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match locked.cached_message(*id) {
                Some(message) => found.push(message),
                None => missing.push(*id),
            }
        }
        (found, missing, locked.store())
    };
    if !missing.is_empty() {
        let wanted = missing.clone();
        let loaded = run_blocking(store, move |store| store.messages(&wanted)).await?;
        let mut locked = broker.lock().unwrap_or_else(Broker::recover);
        let unknown: Vec<MessageId> = missing
            .into_iter()
            .filter(|id| !loaded.iter().any(|msg| msg.id == *id))
            .collect();
        found.extend(loaded.into_iter().map(|msg| locked.cache_message(msg)));
        found.extend(unknown.into_iter().map(|id| Arc::new(Message::bare(id))));
    }
    found.sort_by_key(|msg| msg.id);
    Ok(found)
}
