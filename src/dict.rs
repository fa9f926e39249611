//! Keyed facade.

use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use std::hash::Hash;

#[cfg(not(any(loom, shuttle)))]
use std::time::Duration;

use crate::collection::SafeCollection;
use crate::handle::SafeHandle;
use crate::mode::Mode;
use crate::store::DictStore;
use crate::sync::Arc;

/// Handle type produced by a [`SafeDict`].
pub type DictHandle<K, T> = SafeHandle<T, DictStore<K, T>>;

/// A thread-safe keyed dictionary of shared objects.
///
/// Keyed lookup is O(1); elements additionally keep a stable insertion
/// order, so handles can traverse the dictionary positionally just like a
/// list. Replacing or removing a mapping tombstones the old object and
/// parks it on the pending queue; a reader still holding it is unaffected
/// and the object is reclaimed once the last holder drops.
///
/// # Examples
///
/// ```
/// use safecoll::{Mode, SafeDict};
///
/// let dict: SafeDict<&str, u32> = SafeDict::new();
///
/// assert!(!dict.set_at("answer", 42));
///
/// let handle = dict.find_with_lock(&"answer", Mode::ReadOnly).unwrap();
/// assert_eq!(handle.get(), Some(&42));
/// ```
pub struct SafeDict<K, T>
where
  K: Hash + Eq,
{
  coll: Arc<SafeCollection<T, DictStore<K, T>>>,
}

impl<K, T> SafeDict<K, T>
where
  K: Hash + Eq,
{
  /// Creates an empty dictionary.
  pub fn new() -> Self {
    Self {
      coll: Arc::new(SafeCollection::new(DictStore::new())),
    }
  }

  /// Creates an empty dictionary with room for `capacity` mappings.
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      coll: Arc::new(SafeCollection::new(DictStore::with_capacity(capacity))),
    }
  }

  /// Stores a new element at `key`.
  ///
  /// Any previous mapping is displaced: its object is tombstoned and
  /// queued for reclamation, while threads still holding it keep their
  /// locks until they release. Returns `true` if a mapping was displaced.
  pub fn set_at(&self, key: K, value: T) -> bool {
    self.coll.set_key(key, value)
  }

  /// Removes the mapping at `key`. Returns `false` if absent.
  pub fn remove_key(&self, key: &K) -> bool {
    self.coll.take_key(key)
  }

  /// Returns `true` if a live mapping exists at `key`.
  pub fn contains_key(&self, key: &K) -> bool {
    self.coll.has_key(key)
  }

  /// Binds a handle to the element at `key` in the given mode.
  ///
  /// Blocks while the requested lock is unavailable. If the mapping is
  /// replaced while this thread awaits the lock, the lookup restarts
  /// against the current mapping. Returns `None` if the key is absent.
  pub fn find_with_lock(&self, key: &K, mode: Mode) -> Option<DictHandle<K, T>> {
    loop {
      let (entry, index) = self.coll.entry_for_key(key)?;

      if let Some(handle) =
        SafeHandle::bind_entry(Arc::clone(&self.coll), entry, index, mode)
      {
        return Some(handle);
      }

      // Displaced between lookup and lock; retry against the current
      // mapping.
    }
  }

  /// Binds a handle to the element at insertion-order position `index`.
  ///
  /// Returns `None` if the position is out of range or the element was
  /// removed before the lock was granted.
  pub fn get_with_lock(&self, index: usize, mode: Mode) -> Option<DictHandle<K, T>> {
    SafeHandle::bind_index(Arc::clone(&self.coll), index, mode)
  }

  /// Removes every mapping.
  pub fn remove_all(&self) {
    self.coll.remove_all();
  }

  /// Instantaneous live size. Advisory.
  pub fn len(&self) -> usize {
    self.coll.len()
  }

  /// Returns `true` if no live mappings are present. Advisory.
  pub fn is_empty(&self) -> bool {
    self.coll.is_empty()
  }

  /// Number of displaced objects awaiting reclamation.
  pub fn pending(&self) -> usize {
    self.coll.pending()
  }

  /// Reclaims displaced objects whose last holder has left. Returns the
  /// number reclaimed.
  pub fn collect_garbage(&self) -> usize {
    self.coll.collect_garbage()
  }
}

#[cfg(not(any(loom, shuttle)))]
impl<K, T> SafeDict<K, T>
where
  K: Hash + Eq + Send + 'static,
  T: Send + Sync + 'static,
{
  /// Starts (or restarts) periodic garbage collection every `period`.
  pub fn set_auto_delete(&self, period: Duration) {
    SafeCollection::set_auto_delete(&self.coll, period);
  }

  /// Stops periodic garbage collection.
  pub fn clear_auto_delete(&self) {
    self.coll.clear_auto_delete();
  }
}

impl<K, T> Default for SafeDict<K, T>
where
  K: Hash + Eq,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<K, T> Drop for SafeDict<K, T>
where
  K: Hash + Eq,
{
  /// Removes every mapping and blocks until all outstanding handles have
  /// released and the pending queue has drained.
  fn drop(&mut self) {
    self.coll.shutdown();
  }
}

impl<K, T> Debug for SafeDict<K, T>
where
  K: Hash + Eq,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("SafeDict")
      .field("len", &self.len())
      .field("pending", &self.pending())
      .finish_non_exhaustive()
  }
}
