//! Time-bounded in-process cache.
//!
//! Entries expire a fixed duration after insertion, however often they are
//! read. There is no capacity limit: the dimension vocabularies this fronts are
//! small. Expired entries are dropped when read, or in bulk by
//! [`TtlCache::purge_expired`].

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The live value for `key`, if any.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = Instant::now();
        let mut entries = self.lock();

        match entries.get(key) {
            Some((value, inserted_at)) if now.duration_since(*inserted_at) < self.ttl => {
                return Some(value.clone());
            }
            Some(_) => {}
            None => return None,
        }

        entries.remove(key);
        None
    }

    /// Insert or replace `key`, restarting its TTL.
    pub fn insert(&self, key: K, value: V) {
        self.lock().insert(key, (value, Instant::now()));
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|(_, inserted_at)| now.duration_since(*inserted_at) < self.ttl)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, (_, inserted_at)| now.duration_since(*inserted_at) < self.ttl);
        before - entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, (V, Instant)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
