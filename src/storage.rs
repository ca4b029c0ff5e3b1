//! Concurrent storage for registry slots
//!
//! Uses DashMap for lock-free concurrent access. Slots are stored behind an
//! `Arc` so a lookup can clone the slot out and drop the shard guard before
//! running any constructor.

use crate::catalog::TypeDescriptor;
use crate::factory::Entry;
use crate::Result;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;

/// A bound registry key
pub struct Slot {
    entry: Entry,
    /// Type the entry was registered for, if it came from a resolver
    origin: Option<Arc<TypeDescriptor>>,
}

impl Slot {
    #[inline]
    pub fn new(entry: Entry, origin: Option<Arc<TypeDescriptor>>) -> Self {
        Self { entry, origin }
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn origin(&self) -> Option<&Arc<TypeDescriptor>> {
        self.origin.as_ref()
    }

    /// Whether this slot was registered for the type with `symbol`
    pub fn is_from(&self, symbol: &str) -> bool {
        self.origin.as_ref().is_some_and(|o| o.symbol() == symbol)
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("entry", &self.entry.kind())
            .field("origin", &self.origin.as_ref().map(|o| o.symbol()))
            .finish()
    }
}

/// Thread-safe key → slot storage
///
/// Uses `DashMap` with `ahash` for concurrent reads during request handling.
pub struct RegistryStorage {
    slots: DashMap<String, Arc<Slot>, RandomState>,
}

impl RegistryStorage {
    /// Create new empty storage.
    ///
    /// Uses 8 shards; a registry rarely holds more than a few hundred keys.
    #[inline]
    pub fn new() -> Self {
        Self {
            slots: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// Create with pre-allocated capacity
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        let shard_amount = if capacity <= 64 { 8 } else { 32 };
        Self {
            slots: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shard_amount,
            ),
        }
    }

    /// Bind `key` unless it is already bound. Returns whether the slot was inserted.
    #[inline]
    pub fn insert_if_absent(&self, key: &str, slot: Slot) -> bool {
        use dashmap::mapref::entry::Entry as MapEntry;

        match self.slots.entry(key.to_string()) {
            MapEntry::Occupied(_) => false,
            MapEntry::Vacant(vacant) => {
                vacant.insert(Arc::new(slot));
                true
            }
        }
    }

    /// Like [`insert_if_absent`](Self::insert_if_absent), running `publish`
    /// first while the vacant slot is held. The slot is only inserted if
    /// `publish` succeeds, so readers of `key` never see it without what
    /// `publish` made visible. `publish` must not touch this storage.
    pub fn insert_with<R, F>(&self, key: &str, slot: Slot, publish: F) -> Result<Option<R>>
    where
        F: FnOnce() -> Result<R>,
    {
        use dashmap::mapref::entry::Entry as MapEntry;

        match self.slots.entry(key.to_string()) {
            MapEntry::Occupied(_) => Ok(None),
            MapEntry::Vacant(vacant) => {
                let published = publish()?;
                vacant.insert(Arc::new(slot));
                Ok(Some(published))
            }
        }
    }

    /// Clone the slot out of the map
    #[inline]
    pub fn get(&self, key: &str) -> Option<Arc<Slot>> {
        self.slots.get(key).map(|s| Arc::clone(s.value()))
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All bound keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.slots.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl Default for RegistryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RegistryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryStorage")
            .field("count", &self.len())
            .finish()
    }
}
