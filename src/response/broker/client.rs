use super::{BrokerErr, ClientId, EventQueue, Handler, ServerGeneration, Wake};
use crate::event::{EventKind, EventType, RealmId, UserId};

use hashbrown::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// How a client came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    /// Allocated through `register`; its owner drains the event queue.
    Registered,
    /// Allocated by a `get_updates` poll that named no queue, and reused by the same
    /// user's later polls.
    Polling,
}

/// What a parked request is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parking {
    /// Message ids and pointer moves, delivered through the callback registry.
    Updates,
    /// The client's own event queue.
    Events,
}

/// The broker's handle for one logical client: its queue, its parked request (if any),
/// and how it wants events rendered.
#[derive(Debug)]
pub struct ClientDescriptor {
    pub user_id: UserId,
    pub realm_id: RealmId,
    pub kind: ClientKind,
    pub apply_markdown: bool,
    /// `None` accepts every event type.
    pub event_types: Option<HashSet<EventType>>,
    /// The client application's name, for suppressing echoes of its own messages.
    pub client_name: Option<String>,
    event_queue: EventQueue,
    current_handler: Option<(Handler, Parking)>,
    last_connection_time: Instant,
}

impl ClientDescriptor {
    fn new(
        id: ClientId,
        user_id: UserId,
        realm_id: RealmId,
        apply_markdown: bool,
        now: Instant,
    ) -> Self {
        Self {
            user_id,
            realm_id,
            kind: ClientKind::Registered,
            apply_markdown,
            event_types: None,
            client_name: None,
            event_queue: EventQueue::new(id),
            current_handler: None,
            last_connection_time: now,
        }
    }

    pub fn id(&self) -> ClientId {
        self.event_queue.id()
    }

    pub fn event_queue(&self) -> &EventQueue {
        &self.event_queue
    }

    pub fn event_queue_mut(&mut self) -> &mut EventQueue {
        &mut self.event_queue
    }

    pub fn accepts(&self, event_type: EventType) -> bool {
        self.event_types
            .as_ref()
            .map_or(true, |types| types.contains(&event_type))
    }

    /// Queue `kind` if this client wants it, waking a request parked on the queue.
    ///
    /// A `get_updates` request parked here is left alone: it is woken through the
    /// callback registry, with the message id it needs.
    pub fn push_event(&mut self, kind: EventKind) -> Option<i64> {
        if !self.accepts(kind.event_type()) {
            return None;
        }
        let id = self.event_queue.push(kind);
        if let Some((handler, Parking::Events)) = &self.current_handler {
            handler.fire(Wake::QueueEvent);
        }
        Some(id)
    }

    /// Park `handler` on this client.  A request already parked here is woken and
    /// told it was superseded.
    pub fn connect(&mut self, handler: Handler, parking: Parking, now: Instant) {
        if let Some((previous, _)) = self.current_handler.replace((handler, parking)) {
            previous.fire(Wake::Superseded);
        }
        self.last_connection_time = now;
    }

    /// Detach `handler`, unless a newer request has already replaced it.
    pub fn disconnect(&mut self, handler: &Handler, now: Instant) {
        if self
            .current_handler
            .as_ref()
            .map_or(false, |(current, _)| current.same_request(handler))
        {
            self.current_handler = None;
        }
        self.last_connection_time = now;
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_connection_time = now;
    }

    pub fn last_connection_time(&self) -> Instant {
        self.last_connection_time
    }

    /// Probe the parked request, detaching it if its connection is gone.
    pub fn has_live_handler(&mut self) -> bool {
        if let Some((handler, _)) = &self.current_handler {
            if !handler.is_alive() {
                log::info!("Detaching closed request from client {}", self.id());
                self.current_handler = None;
            }
        }
        self.current_handler.is_some()
    }

    pub fn is_idle(&mut self, now: Instant, timeout: Duration) -> bool {
        !self.has_live_handler()
            && now.saturating_duration_since(self.last_connection_time) >= timeout
    }
}

/// Every live `ClientDescriptor`, by client id and by owning user.
#[derive(Debug)]
pub struct ClientRegistry {
    generation: ServerGeneration,
    next_seq: u64,
    by_id: HashMap<ClientId, ClientDescriptor>,
    by_user: HashMap<UserId, Vec<ClientId>>,
}

impl ClientRegistry {
    pub fn new(generation: ServerGeneration) -> Self {
        Self {
            generation,
            next_seq: 0,
            by_id: HashMap::new(),
            by_user: HashMap::new(),
        }
    }

    pub fn generation(&self) -> ServerGeneration {
        self.generation
    }

    pub fn allocate(
        &mut self,
        user_id: UserId,
        realm_id: RealmId,
        apply_markdown: bool,
        now: Instant,
    ) -> &mut ClientDescriptor {
        let id = ClientId {
            generation: self.generation,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.by_user.entry(user_id).or_default().push(id);
        log::info!("Allocated client {} for user {}", id, user_id);
        self.by_id
            .entry(id)
            .or_insert_with(|| ClientDescriptor::new(id, user_id, realm_id, apply_markdown, now))
    }

    /// Turn a client-supplied id back into a live one.
    ///
    /// Ids from an earlier process generation, ids of reclaimed clients, and garbage all
    /// fail with `BrokerErr::BadQueueId`.
    pub fn resolve(&self, raw: &str) -> Result<ClientId, BrokerErr> {
        match raw.parse::<ClientId>() {
            Ok(id) if id.generation == self.generation && self.by_id.contains_key(&id) => Ok(id),
            _ => Err(BrokerErr::BadQueueId(raw.to_string())),
        }
    }

    pub fn get(&self, id: &ClientId) -> Option<&ClientDescriptor> {
        self.by_id.get(id)
    }

    pub fn get_mut(&mut self, id: &ClientId) -> Option<&mut ClientDescriptor> {
        self.by_id.get_mut(id)
    }

    pub fn ids_for_user(&self, user_id: UserId) -> Vec<ClientId> {
        self.by_user.get(&user_id).cloned().unwrap_or_default()
    }

    /// The `Polling` client `user_id`'s plain polls share, if one is still live.
    pub fn polling_client(
        &self,
        user_id: UserId,
        client_name: Option<&str>,
        apply_markdown: bool,
    ) -> Option<ClientId> {
        self.by_user
            .get(&user_id)?
            .iter()
            .copied()
            .find(|id| {
                self.by_id.get(id).map_or(false, |client| {
                    client.kind == ClientKind::Polling
                        && client.apply_markdown == apply_markdown
                        && client.client_name.as_deref() == client_name
                })
            })
    }

    pub fn for_user_mut(&mut self, user_id: UserId, mut f: impl FnMut(&mut ClientDescriptor)) {
        let Self { by_id, by_user, .. } = self;
        for id in by_user.get(&user_id).into_iter().flatten() {
            if let Some(client) = by_id.get_mut(id) {
                f(client)
            }
        }
    }

    fn remove(&mut self, id: &ClientId) -> Option<ClientDescriptor> {
        let client = self.by_id.remove(id)?;
        if let Some(ids) = self.by_user.get_mut(&client.user_id) {
            ids.retain(|other| other != id);
            if ids.is_empty() {
                self.by_user.remove(&client.user_id);
            }
        }
        Some(client)
    }

    /// Reclaim every client with no live request that hasn't connected within `timeout`.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<ClientId> {
        let expired: Vec<ClientId> = self
            .by_id
            .iter_mut()
            .filter_map(|(id, client)| client.is_idle(now, timeout).then(|| *id))
            .collect();
        for id in &expired {
            self.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
