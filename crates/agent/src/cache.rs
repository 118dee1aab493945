//! Capacity-bounded map for per-thread state held in process memory.
//!
//! Reads and writes mark an entry as used; inserting past capacity drops the
//! least recently used entry.

use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

/// Threads kept in memory per strategy when no capacity is configured.
pub const DEFAULT_THREAD_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct LruMap<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (u64, V)>,
}

impl<K: Eq + Hash + Clone, V> LruMap<K, V> {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        let tick = self.next_tick();
        self.entries.get_mut(key).map(|(used, value)| {
            *used = tick;
            &*value
        })
    }

    pub fn insert(&mut self, key: K, value: V) {
        let tick = self.next_tick();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (used, _))| *used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
                debug!(capacity = self.capacity, "Evicted least recently used thread state");
            }
        }
        self.entries.insert(key, (tick, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K: Eq + Hash + Clone, V> Default for LruMap<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_THREAD_CAPACITY)
    }
}
