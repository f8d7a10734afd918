use super::ClientId;
use crate::event::{Event, EventKind};

use std::collections::VecDeque;
use std::fmt;

/// The ordered buffer of events waiting for one client.
///
/// Event ids start at 0 and only grow; the client acknowledges a prefix by passing its
/// last seen id back, and that prefix is pruned.
#[derive(Clone)]
pub struct EventQueue {
    id: ClientId,
    queue: VecDeque<Event>,
    next_event_id: i64,
}

impl EventQueue {
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            queue: VecDeque::new(),
            next_event_id: 0,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Append an event, returning the id it was assigned.
    pub fn push(&mut self, kind: EventKind) -> i64 {
        let id = self.next_event_id;
        self.next_event_id += 1;
        self.queue.push_back(Event { id, kind });
        id
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    /// Drop every event with an id at or below `through_id`.
    pub fn prune(&mut self, through_id: i64) {
        while self
            .queue
            .front()
            .map_or(false, |event| event.id <= through_id)
        {
            self.queue.pop_front();
        }
    }

    pub fn contents(&self) -> Vec<Event> {
        self.queue.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventQueue {{ id: {}, pending: {}, next_event_id: {} }}",
            self.id,
            self.queue.len(),
            self.next_event_id
        )
    }
}
