//! In-process key/value store with per-entry time-to-live.
//!
//! Every entry is stamped with its insertion time and a TTL. A TTL of zero
//! means the entry never expires; otherwise the entry stops being served once
//! `now >= inserted_at + ttl` and is removed on the first read that notices it.
//!
//! The store has no size bound and no eviction other than expiry.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::clock::{Clock, SystemClock};

/// TTL that never expires.
pub const NEVER_EXPIRES: Duration = Duration::ZERO;

/// Lookup failures of a [`TtlStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The key was never stored (or was deleted).
    #[error("key not present")]
    Miss,

    /// The key was present but its TTL elapsed; the entry has been removed.
    #[error("key expired")]
    Expired,

    /// `set_ttl` was called for an absent key.
    #[error("key not found")]
    NotFound,
}

impl StoreError {
    /// Miss and Expired both mean "not here, ask the next tier".
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Miss | Self::Expired)
    }
}

/// A stored value with its expiry bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// When the value was stored.
    pub inserted_at: DateTime<Utc>,

    /// Lifetime measured from `inserted_at`. Zero means forever.
    pub ttl: Duration,

    pub value: V,
}

impl<V> CacheEntry<V> {
    /// Instant from which the entry is no longer served, if it expires at all.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.ttl.is_zero() {
            return None;
        }
        TimeDelta::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.inserted_at.checked_add_signed(ttl))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

/// Mapping with per-entry insertion time and TTL.
///
/// Not synchronized; callers that share a store across tasks wrap it in a lock
/// so that expiry eviction and writes for a key form one critical section.
#[derive(Debug)]
pub struct TtlStore<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash, V> TtlStore<K, V> {
    /// Create a store using the wall clock.
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    /// Create a store reading time from `clock`.
    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
            clock,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `value` with the default TTL.
    pub fn set(&mut self, key: K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Store `value` with an explicit TTL, replacing any previous entry.
    pub fn set_with_ttl(&mut self, key: K, value: V, ttl: Duration) {
        let entry = CacheEntry {
            inserted_at: self.clock.now(),
            ttl,
            value,
        };
        self.entries.insert(key, entry);
    }

    /// Get a live value. Expired entries are removed and reported as [`StoreError::Expired`].
    pub fn get<Q>(&mut self, key: &Q) -> Result<&V, StoreError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return Err(StoreError::Miss),
        };

        if expired {
            self.entries.remove(key);
            return Err(StoreError::Expired);
        }

        self.entries
            .get(key)
            .map(|entry| &entry.value)
            .ok_or(StoreError::Miss)
    }

    /// True iff [`get`](Self::get) would return a value.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Change the TTL of a stored entry.
    ///
    /// The value and the original insertion time are kept, so the new TTL is
    /// measured from when the value was stored, not from this call.
    pub fn set_ttl<Q>(&mut self, key: &Q, ttl: Duration) -> Result<(), StoreError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.entries.get_mut(key).ok_or(StoreError::NotFound)?;
        entry.ttl = ttl;
        Ok(())
    }

    /// Remove an entry, returning its value if it was present (expired or not).
    pub fn delete<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Raw entry access, including entries that have expired but were not yet read.
    pub fn entry<Q>(&self, key: &Q) -> Option<&CacheEntry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    /// Number of stored entries, expired ones included until they are read or purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
