//! A [WeightedLru] is an Lru cache which evicts based on the summed weight of its items rather than their count.
//!
//! Storage is a vec-backed doubly linked list with a free list threaded through the empty slots, plus an auxiliary
//! hash-based index from key to slot.  The head of the list is the most recently used entry, the tail the least
//! recently used one.
//!
//! Weights are recorded at insertion time.  Removal and eviction subtract the recorded figure, so the running total
//! can never drift from the sum of the weights of the entries present, whatever happens to the values afterwards.
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use ahash::RandomState;
use tracing::trace;

struct OccupiedSlot<K: ?Sized, V> {
    key: Arc<K>,
    item: Arc<V>,
    prev: Option<usize>,
    next: Option<usize>,
    weight: u64,
}

struct EmptySlot {
    next_empty: Option<usize>,
}

enum Slot<K: ?Sized, V> {
    /// Free, possibly pointing at the next free slot.
    Empty(EmptySlot),
    /// Holds an entry, doubly linked to its neighbours in recency order.
    Occupied(OccupiedSlot<K, V>),
}

impl<K: ?Sized, V> Slot<K, V> {
    fn as_occupied(&self) -> &OccupiedSlot<K, V> {
        match self {
            Self::Occupied(ref x) => x,
            _ => panic!("Slot should be occupied"),
        }
    }

    fn as_occupied_mut(&mut self) -> &mut OccupiedSlot<K, V> {
        match self {
            Self::Occupied(ref mut x) => x,
            _ => panic!("Slot should be occupied"),
        }
    }

    fn as_empty(&self) -> &EmptySlot {
        match self {
            Self::Empty(ref x) => x,
            _ => panic!("Slot should be empty"),
        }
    }
}

pub struct WeightedLru<K: ?Sized + Hash + Eq, V> {
    slots: Vec<Slot<K, V>>,
    index: HashMap<Arc<K>, usize, RandomState>,
    /// Eviction starts once the total weight goes above this.
    max_weight: u64,
    head: Option<usize>,
    tail: Option<usize>,
    empty_head: Option<usize>,
    current_weight: u64,
}

impl<K: ?Sized + Hash + Eq, V> WeightedLru<K, V> {
    pub fn new(max_weight: u64) -> WeightedLru<K, V> {
        WeightedLru {
            slots: Default::default(),
            index: Default::default(),
            max_weight,
            head: None,
            tail: None,
            empty_head: None,
            current_weight: 0,
        }
    }

    /// Detach an occupied slot from the recency list, patching up the head and tail.
    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let e = self.slots[slot].as_occupied();
            (e.prev, e.next)
        };

        match prev {
            Some(p) => self.slots[p].as_occupied_mut().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_occupied_mut().prev = prev,
            None => self.tail = prev,
        }

        let e = self.slots[slot].as_occupied_mut();
        e.prev = None;
        e.next = None;
    }

    /// Link a detached occupied slot in as the most recent entry.
    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let e = self.slots[slot].as_occupied_mut();
            e.prev = None;
            e.next = old_head;
        }

        match old_head {
            Some(h) => self.slots[h].as_occupied_mut().prev = Some(slot),
            // The list was empty, so this is the tail as well.
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn make_most_recent(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }

        self.unlink(slot);
        self.push_front(slot);
    }

    /// Free an occupied slot, returning what it held.
    fn vacate(&mut self, slot: usize) -> (Arc<K>, Arc<V>) {
        self.unlink(slot);
        let old = std::mem::replace(
            &mut self.slots[slot],
            Slot::Empty(EmptySlot {
                next_empty: self.empty_head,
            }),
        );
        self.empty_head = Some(slot);

        match old {
            Slot::Occupied(OccupiedSlot {
                key, item, weight, ..
            }) => {
                self.index.remove(&*key);
                self.current_weight -= weight;
                (key, item)
            }
            _ => panic!("Should have been occupied"),
        }
    }

    /// Find a free slot, growing the storage if there is none.
    fn claim_empty(&mut self) -> usize {
        if let Some(e) = self.empty_head {
            self.empty_head = self.slots[e].as_empty().next_empty;
            return e;
        }

        self.slots.push(Slot::Empty(EmptySlot { next_empty: None }));
        self.slots.len() - 1
    }

    /// Add an entry as the most recently used one, then evict down to the maximum weight.
    ///
    /// Any entry already under this key is removed first, so its weight is never counted twice; it is returned.
    pub fn insert(&mut self, key: Arc<K>, value: V, weight: u64) -> Option<Arc<V>> {
        self.insert_arc(key, Arc::new(value), weight)
    }

    /// Like [WeightedLru::insert], for values which are already shared.
    pub fn insert_arc(&mut self, key: Arc<K>, value: Arc<V>, weight: u64) -> Option<Arc<V>> {
        let replaced = self.remove(&*key);

        // Anything the total can't absorb is over the maximum anyway, so evict before touching the list.
        while self.current_weight.checked_add(weight).is_none() {
            match self.tail {
                Some(t) => {
                    self.vacate(t);
                }
                None => break,
            }
        }

        let slot = self.claim_empty();

        self.slots[slot] = Slot::Occupied(OccupiedSlot {
            key: key.clone(),
            item: value,
            prev: None,
            next: None,
            weight,
        });
        self.push_front(slot);
        self.index.insert(key, slot);
        self.current_weight += weight;

        // The entry just inserted is never evicted to make room for itself.
        self.evict_until(self.max_weight, 1);
        replaced
    }

    /// Look up an entry, marking it as the most recently used.
    pub fn get(&mut self, key: &K) -> Option<Arc<V>> {
        let slot = *self.index.get(key)?;
        self.make_most_recent(slot);
        Some(self.slots[slot].as_occupied().item.clone())
    }

    /// Look up an entry without touching its recency.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        let slot = *self.index.get(key)?;
        Some(self.slots[slot].as_occupied().item.clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<Arc<V>> {
        let slot = *self.index.get(key)?;
        Some(self.vacate(slot).1)
    }

    /// Evict least recently used entries until the total weight is at most `target` or the cache is empty.
    ///
    /// Returns how many entries were evicted.
    pub fn trim_to_size(&mut self, target: u64) -> usize {
        self.evict_until(target, 0)
    }

    /// Evict everything, oldest first.
    pub fn clear(&mut self) {
        self.trim_to_size(0);

        // Zero-weight entries survive a trim to zero.
        while let Some(t) = self.tail {
            self.vacate(t);
        }

        self.slots.clear();
        self.empty_head = None;
    }

    /// Change the maximum weight, evicting if it shrank.
    ///
    /// As with insertion, the most recently used entry is kept even if it alone is over the new maximum.
    pub fn set_max_weight(&mut self, max_weight: u64) -> usize {
        self.max_weight = max_weight;
        self.evict_until(max_weight, 1)
    }

    /// Evict from the tail while over `target` and more than `keep` entries remain.
    fn evict_until(&mut self, target: u64, keep: usize) -> usize {
        let mut evicted = 0;
        while self.current_weight > target && self.index.len() > keep {
            let tail = match self.tail {
                Some(t) => t,
                None => panic!("Not enough entries to explain weight"),
            };

            let weight = self.slots[tail].as_occupied().weight;
            self.vacate(tail);
            evicted += 1;
            trace!(
                weight,
                remaining = self.current_weight,
                "evicted least recently used entry"
            );
        }

        evicted
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Summed weight of every entry currently present.
    pub fn current_weight(&self) -> u64 {
        self.current_weight
    }

    pub fn max_weight(&self) -> u64 {
        self.max_weight
    }

    /// The key which would be evicted next.
    pub fn lru_key(&self) -> Option<&K> {
        self.tail.map(|t| &*self.slots[t].as_occupied().key)
    }

    /// Iterator visiting entries in most-recently-used order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut slot = self.head;
        std::iter::from_fn(move || {
            let cur = self.slots[slot?].as_occupied();
            slot = cur.next;
            Some((&*cur.key, &*cur.item))
        })
    }
}
