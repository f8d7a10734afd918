use super::{BrokerErr, Key};
use crate::event::MessageId;

use hashbrown::HashMap;
use std::collections::VecDeque;

/// Bounded, newest-first buffers of recently delivered message ids, one per `Key`.
///
/// A key is "cold" until it has been backfilled from the persistence tier once; ids
/// ingested while a key is cold are kept and merged with the backfill.
#[derive(Debug)]
pub struct MTables {
    capacity: usize,
    tables: HashMap<Key, Table>,
}

#[derive(Debug, Default)]
struct Table {
    ids: VecDeque<MessageId>,
    warm: bool,
}

impl Table {
    fn push_newest(&mut self, id: MessageId, capacity: usize) {
        self.ids.push_front(id);
        self.ids.truncate(capacity);
    }
}

impl MTables {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tables: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn add_id(&mut self, key: &Key, id: MessageId) {
        let capacity = self.capacity;
        match self.tables.get_mut(key) {
            Some(table) => table.push_newest(id, capacity),
            None => {
                let mut table = Table::default();
                table.push_newest(id, capacity);
                self.tables.insert(key.clone(), table);
            }
        }
    }

    pub fn is_warm(&self, key: &Key) -> bool {
        self.tables.get(key).map_or(false, |table| table.warm)
    }

    /// Install the result of the one-time backfill for `key`.
    ///
    /// `newest_first` comes straight from the persistence tier.  Anything ingested for the
    /// key in the meantime is merged in; the buffer stays newest-first, deduplicated, and
    /// within capacity.
    pub fn backfill(&mut self, key: &Key, newest_first: Vec<MessageId>) {
        let capacity = self.capacity;
        let table = self.tables.entry(key.clone()).or_default();
        let mut merged: Vec<MessageId> = table.ids.drain(..).chain(newest_first).collect();
        merged.sort_unstable_by(|a, b| b.cmp(a));
        merged.dedup();
        merged.truncate(capacity);
        table.ids = merged.into();
        table.warm = true;
    }

    /// The buffered ids newer than `last`, oldest first.
    ///
    /// Returns `Ok(None)` when `key` still needs its backfill.  Fails with
    /// `BrokerErr::StaleCursor` when `last` predates the oldest buffered id: the buffer
    /// can't tell whether anything between the two was missed.
    pub fn fetch(&self, key: &Key, last: MessageId) -> Result<Option<Vec<MessageId>>, BrokerErr> {
        let table = match self.tables.get(key) {
            Some(table) if table.warm => table,
            _ => return Ok(None),
        };
        let oldest = match table.ids.back() {
            Some(oldest) => *oldest,
            None => return Ok(Some(Vec::new())),
        };
        if last < oldest {
            return Err(BrokerErr::StaleCursor {
                key: key.clone(),
                min_last: oldest,
            });
        }
        Ok(Some(
            table
                .ids
                .iter()
                .rev()
                .copied()
                .filter(|id| *id > last)
                .collect(),
        ))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::{RealmId, UserId};

    fn warm(ids: &[MessageId]) -> (MTables, Key) {
        let key = Key::User(UserId(1));
        let mut tables = MTables::new(400);
        tables.backfill(&key, ids.to_vec());
        (tables, key)
    }

    #[test]
    fn fetch_returns_newer_ids_ascending() {
        let (tables, key) = warm(&[9, 8, 7, 6, 5, 4]);
        assert_eq!(tables.fetch(&key, 5).expect("in test"), Some(vec![6, 7, 8, 9]));
        assert_eq!(tables.fetch(&key, 4).expect("in test"), Some(vec![5, 6, 7, 8, 9]));
        assert_eq!(tables.fetch(&key, 9).expect("in test"), Some(vec![]));
        assert_eq!(tables.fetch(&key, 1000).expect("in test"), Some(vec![]));
    }

    #[test]
    fn cursor_older_than_the_buffer_is_stale() {
        let (tables, key) = warm(&[9, 8, 7, 6, 5, 4]);
        match tables.fetch(&key, 3) {
            Err(BrokerErr::StaleCursor { min_last, .. }) => assert_eq!(min_last, 4),
            other => panic!("expected a stale cursor, got {:?}", other),
        }
    }

    #[test]
    fn empty_history_is_not_an_error() {
        let (tables, key) = warm(&[]);
        assert_eq!(tables.fetch(&key, 0).expect("in test"), Some(vec![]));
    }

    #[test]
    fn cold_keys_ask_for_a_backfill() {
        let key = Key::stream(RealmId(1), "Verona");
        let mut tables = MTables::new(400);
        assert_eq!(tables.fetch(&key, 0).expect("in test"), None);

        // ingesting into a cold key doesn't make it warm
        tables.add_id(&key, 12);
        assert!(!tables.is_warm(&key));
        assert_eq!(tables.fetch(&key, 0).expect("in test"), None);

        tables.backfill(&key, vec![11, 10]);
        assert!(tables.is_warm(&key));
        assert_eq!(tables.fetch(&key, 10).expect("in test"), Some(vec![11, 12]));
    }

    #[test]
    fn stream_keys_ignore_case() {
        let mut tables = MTables::new(400);
        tables.backfill(&Key::stream(RealmId(1), "Verona"), vec![3]);
        assert!(tables.is_warm(&Key::stream(RealmId(1), "VERONA")));
        assert!(!tables.is_warm(&Key::stream(RealmId(2), "verona")));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let key = Key::User(UserId(1));
        let mut tables = MTables::new(3);
        tables.backfill(&key, vec![]);
        for id in 1..=5 {
            tables.add_id(&key, id);
        }
        assert_eq!(tables.fetch(&key, 3).expect("in test"), Some(vec![4, 5]));
        assert!(tables.fetch(&key, 2).is_err());
    }

    #[test]
    fn backfill_merges_ids_ingested_while_cold() {
        let key = Key::User(UserId(1));
        let mut tables = MTables::new(4);
        tables.add_id(&key, 21);
        tables.add_id(&key, 20);
        tables.backfill(&key, vec![20, 19, 18, 17, 16]);
        assert_eq!(tables.fetch(&key, 18).expect("in test"), Some(vec![19, 20, 21]));
        assert!(tables.fetch(&key, 17).is_err());
    }
}
