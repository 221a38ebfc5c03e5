//! Last-known reading per channel
//!
//! The polling thread is the only writer; filesystem callbacks read
//! concurrently. Entries are never removed, so the set of known ids only
//! grows for the life of the process.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

/// Most recent decoded value for one logger channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Channel id, unique within the cache.
    pub id: u16,
    /// Latest raw value as reported by the device.
    pub raw: i16,
    /// When this channel was first observed. Never changes after insertion.
    pub created_at: SystemTime,
    /// When this channel was last observed. Never moves backwards.
    pub updated_at: SystemTime,
}

#[derive(Debug)]
struct Inner {
    readings: HashMap<u16, Reading>,
    last_update: SystemTime,
}

/// Concurrency-safe cache of the latest reading per channel id.
///
/// A single coarse lock is enough here: there is exactly one writer and the
/// readers are sporadic filesystem callbacks.
#[derive(Debug)]
pub struct ReadingCache {
    first_seen: SystemTime,
    inner: RwLock<Inner>,
}

impl ReadingCache {
    pub fn new(now: SystemTime) -> Self {
        Self {
            first_seen: now,
            inner: RwLock::new(Inner {
                readings: HashMap::new(),
                last_update: now,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Record an observation: insert on first sight of the id, overwrite
    /// afterwards.
    pub fn upsert(&self, id: u16, raw: i16, now: SystemTime) {
        let mut inner = self.write();
        inner.last_update = inner.last_update.max(now);
        match inner.readings.entry(id) {
            Entry::Occupied(mut entry) => {
                let reading = entry.get_mut();
                reading.raw = raw;
                reading.updated_at = reading.updated_at.max(now);
            }
            Entry::Vacant(entry) => {
                entry.insert(Reading {
                    id,
                    raw,
                    created_at: now,
                    updated_at: now,
                });
            }
        }
    }

    /// Point lookup of one channel.
    pub fn lookup(&self, id: u16) -> Option<Reading> {
        self.read().readings.get(&id).copied()
    }

    /// Snapshot of all known channel ids, in no particular order.
    pub fn ids(&self) -> Vec<u16> {
        self.read().readings.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().readings.is_empty()
    }

    /// When the cache was created.
    pub fn first_seen(&self) -> SystemTime {
        self.first_seen
    }

    /// When any reading was last created or refreshed.
    pub fn last_update(&self) -> SystemTime {
        self.read().last_update
    }
}
