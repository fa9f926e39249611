//! Underlying containers injected into a collection.
//!
//! A [`Store`] is the opaque structural layer beneath a
//! [`SafeCollection`](crate::SafeCollection): it holds entries in a stable
//! positional order and knows nothing about references, locks, or
//! tombstones. All calls into a store happen with the collection mutex held.

use core::mem;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::object::SafeObject;
use crate::sync::Arc;

/// A shared entry: the collection and every handle hold one of these.
pub type Entry<T> = Arc<SafeObject<T>>;

// -----------------------------------------------------------------------------
// Store
// -----------------------------------------------------------------------------

/// Positional storage of entries.
///
/// Positions shift when an entry before them is detached; traversal copes
/// with that via identity lookups ([`position`]) and a position hint, so a
/// store only has to keep relative order stable.
///
/// [`position`]: Store::position
pub trait Store<T> {
  /// Number of stored entries.
  fn len(&self) -> usize;

  /// Returns `true` if no entries are stored.
  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// The entry at `index`, if in range.
  fn get(&self, index: usize) -> Option<&Entry<T>>;

  /// Locates an entry by identity.
  fn position(&self, entry: &Entry<T>) -> Option<usize>;

  /// Removes and returns the entry at `index`, shifting later entries left.
  fn detach(&mut self, index: usize) -> Option<Entry<T>>;

  /// Removes and returns all entries in order.
  fn drain(&mut self) -> Vec<Entry<T>>;
}

// -----------------------------------------------------------------------------
// ListStore
// -----------------------------------------------------------------------------

/// An ordered sequence of entries.
#[derive(Debug)]
pub struct ListStore<T> {
  entries: Vec<Entry<T>>,
}

impl<T> Default for ListStore<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> ListStore<T> {
  pub fn new() -> Self {
    Self {
      entries: Vec::new(),
    }
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      entries: Vec::with_capacity(capacity),
    }
  }

  /// Appends an entry, returning its position.
  pub(crate) fn append(&mut self, entry: Entry<T>) -> usize {
    self.entries.push(entry);
    self.entries.len() - 1
  }
}

impl<T> Store<T> for ListStore<T> {
  fn len(&self) -> usize {
    self.entries.len()
  }

  fn get(&self, index: usize) -> Option<&Entry<T>> {
    self.entries.get(index)
  }

  fn position(&self, entry: &Entry<T>) -> Option<usize> {
    self.entries.iter().position(|item| Arc::ptr_eq(item, entry))
  }

  fn detach(&mut self, index: usize) -> Option<Entry<T>> {
    if index < self.entries.len() {
      Some(self.entries.remove(index))
    } else {
      None
    }
  }

  fn drain(&mut self) -> Vec<Entry<T>> {
    mem::take(&mut self.entries)
  }
}

// -----------------------------------------------------------------------------
// DictStore
// -----------------------------------------------------------------------------

/// A keyed map of entries preserving insertion order.
///
/// Backed by [`IndexMap`] so that keyed lookup is O(1) while positional
/// access and traversal see the same stable ordering a sequence store
/// provides. Detaching uses shifting removal to keep that order intact.
#[derive(Debug)]
pub struct DictStore<K, T> {
  entries: IndexMap<K, Entry<T>>,
}

impl<K, T> DictStore<K, T>
where
  K: Hash + Eq,
{
  pub fn new() -> Self {
    Self {
      entries: IndexMap::new(),
    }
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      entries: IndexMap::with_capacity(capacity),
    }
  }

  /// Stores `entry` at `key`, returning the displaced entry if the key was
  /// already mapped.
  pub(crate) fn insert_key(&mut self, key: K, entry: Entry<T>) -> Option<Entry<T>> {
    self.entries.insert(key, entry)
  }

  /// Removes and returns the entry at `key`, shifting later entries left.
  pub(crate) fn take_key(&mut self, key: &K) -> Option<Entry<T>> {
    self.entries.shift_remove(key)
  }

  /// The entry at `key`, with its current position.
  pub(crate) fn get_key(&self, key: &K) -> Option<(usize, &Entry<T>)> {
    self
      .entries
      .get_full(key)
      .map(|(index, _, entry)| (index, entry))
  }

  pub(crate) fn contains_key(&self, key: &K) -> bool {
    self.entries.contains_key(key)
  }
}

impl<K, T> Default for DictStore<K, T>
where
  K: Hash + Eq,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<K, T> Store<T> for DictStore<K, T>
where
  K: Hash + Eq,
{
  fn len(&self) -> usize {
    self.entries.len()
  }

  fn get(&self, index: usize) -> Option<&Entry<T>> {
    self.entries.get_index(index).map(|(_, entry)| entry)
  }

  fn position(&self, entry: &Entry<T>) -> Option<usize> {
    self
      .entries
      .values()
      .position(|item| Arc::ptr_eq(item, entry))
  }

  fn detach(&mut self, index: usize) -> Option<Entry<T>> {
    self
      .entries
      .shift_remove_index(index)
      .map(|(_, entry)| entry)
  }

  fn drain(&mut self) -> Vec<Entry<T>> {
    self.entries.drain(..).map(|(_, entry)| entry).collect()
  }
}
