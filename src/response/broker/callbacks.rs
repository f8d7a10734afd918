use super::{Handler, Key, Wake};

use hashbrown::HashMap;

/// The kind of change a parked request is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    UserReceive,
    StreamReceive,
    PointerUpdate,
}

impl Category {
    const COUNT: usize = 3;

    fn idx(self) -> usize {
        match self {
            Self::UserReceive => 0,
            Self::StreamReceive => 1,
            Self::PointerUpdate => 2,
        }
    }
}

/// One-shot wake-ups for parked long-polls, by key and category.
///
/// `call` fires and forgets: a request that wants to keep waiting after it is woken
/// must `add` itself again.
#[derive(Debug, Default)]
pub struct Callbacks {
    table: HashMap<Key, [Vec<Handler>; Category::COUNT]>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: Key, category: Category, handler: Handler) {
        self.table.entry(key).or_default()[category.idx()].push(handler);
    }

    /// Wake every request pending on (`key`, `category`) and clear the list.  Returns the
    /// number of requests actually woken; ones that already went away are skipped.
    pub fn call(&mut self, key: &Key, category: Category, wake: Wake) -> usize {
        let pending = match self.table.get_mut(key) {
            Some(slots) => std::mem::take(&mut slots[category.idx()]),
            None => return 0,
        };
        let woken = pending
            .iter()
            .filter(|handler| handler.fire(wake.clone()))
            .count();
        if woken > 0 {
            log::info!("Woke {} request(s) on {} ({:?})", woken, key, category);
        }
        woken
    }

    pub fn pending(&self, key: &Key, category: Category) -> usize {
        self.table
            .get(key)
            .map_or(0, |slots| slots[category.idx()].len())
    }

    /// Forget requests that have been woken elsewhere or whose client disconnected,
    /// and drop keys nobody waits on.
    pub fn prune_closed(&mut self) -> usize {
        let mut pruned = 0;
        self.table.retain(|_key, slots| {
            for slot in slots.iter_mut() {
                let before = slot.len();
                slot.retain(Handler::is_alive);
                pruned += before - slot.len();
            }
            slots.iter().any(|slot| !slot.is_empty())
        });
        pruned
    }

    pub fn total_pending(&self) -> usize {
        self.table
            .values()
            .map(|slots| slots.iter().map(Vec::len).sum::<usize>())
            .sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::UserId;

    #[test]
    fn call_wakes_each_callback_once_and_clears() {
        let mut callbacks = Callbacks::new();
        let key = Key::User(UserId(1));
        let (a, mut rx_a) = Handler::new();
        let (b, mut rx_b) = Handler::new();
        callbacks.add(key.clone(), Category::UserReceive, a);
        callbacks.add(key.clone(), Category::UserReceive, b);

        assert_eq!(callbacks.call(&key, Category::UserReceive, Wake::NewMessage(5)), 2);
        assert_eq!(rx_a.try_recv().expect("in test"), Wake::NewMessage(5));
        assert_eq!(rx_b.try_recv().expect("in test"), Wake::NewMessage(5));
        assert_eq!(callbacks.pending(&key, Category::UserReceive), 0);
        assert_eq!(callbacks.call(&key, Category::UserReceive, Wake::NewMessage(6)), 0);
    }

    #[test]
    fn callback_added_after_call_waits_for_the_next_one() {
        let mut callbacks = Callbacks::new();
        let key = Key::User(UserId(1));
        let (a, _rx_a) = Handler::new();
        callbacks.add(key.clone(), Category::UserReceive, a);
        callbacks.call(&key, Category::UserReceive, Wake::NewMessage(5));

        let (late, mut rx_late) = Handler::new();
        callbacks.add(key.clone(), Category::UserReceive, late);
        assert!(rx_late.try_recv().is_err());
        assert_eq!(callbacks.pending(&key, Category::UserReceive), 1);
        callbacks.call(&key, Category::UserReceive, Wake::NewMessage(6));
        assert_eq!(rx_late.try_recv().expect("in test"), Wake::NewMessage(6));
    }

    #[test]
    fn categories_are_independent() {
        let mut callbacks = Callbacks::new();
        let key = Key::User(UserId(1));
        let (receiver, mut rx_receive) = Handler::new();
        let (pointer, mut rx_pointer) = Handler::new();
        callbacks.add(key.clone(), Category::UserReceive, receiver);
        callbacks.add(key.clone(), Category::PointerUpdate, pointer);

        callbacks.call(&key, Category::PointerUpdate, Wake::Pointer(10));
        assert!(rx_receive.try_recv().is_err());
        assert_eq!(rx_pointer.try_recv().expect("in test"), Wake::Pointer(10));
        assert_eq!(callbacks.pending(&key, Category::UserReceive), 1);
    }

    #[test]
    fn closed_requests_are_skipped_and_pruned() {
        let mut callbacks = Callbacks::new();
        let stream = Key::stream(Default::default(), "Denmark");
        let (gone, rx_gone) = Handler::new();
        let (here, _rx_here) = Handler::new();
        callbacks.add(stream.clone(), Category::StreamReceive, gone);
        callbacks.add(Key::User(UserId(2)), Category::UserReceive, here);
        drop(rx_gone);

        assert_eq!(callbacks.prune_closed(), 1);
        assert_eq!(callbacks.pending(&stream, Category::StreamReceive), 0);
        assert_eq!(callbacks.total_pending(), 1);
        assert_eq!(callbacks.call(&stream, Category::StreamReceive, Wake::NewMessage(1)), 0);
    }
}
