//! Positional facade.

use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;

#[cfg(not(any(loom, shuttle)))]
use std::time::Duration;

use crate::collection::SafeCollection;
use crate::handle::SafeHandle;
use crate::mode::Mode;
use crate::store::Entry;
use crate::store::ListStore;
use crate::sync::Arc;

/// Handle type produced by a [`SafeList`].
pub type ListHandle<T> = SafeHandle<T, ListStore<T>>;

/// A thread-safe ordered list of shared objects.
///
/// Elements are appended at the end and addressed by position. Removal is
/// deferred: a removed element is tombstoned and parked on the pending
/// queue until every handle on it has been dropped and garbage collection
/// runs, so readers are never invalidated mid-flight.
///
/// Handles returned by [`get_with_lock`] and [`find_with_lock`] keep the
/// underlying collection alive; dropping the list itself removes all
/// elements and blocks until outstanding handles release.
///
/// # Examples
///
/// ```
/// use safecoll::{Mode, SafeList};
///
/// let list: SafeList<String> = SafeList::new();
///
/// list.append("alpha".to_string());
/// list.append("beta".to_string());
///
/// let mut handle = list.get_with_lock(0, Mode::ReadOnly).unwrap();
/// assert_eq!(handle.get().map(String::as_str), Some("alpha"));
///
/// assert!(handle.next());
/// assert_eq!(handle.get().map(String::as_str), Some("beta"));
/// ```
///
/// [`get_with_lock`]: SafeList::get_with_lock
/// [`find_with_lock`]: SafeList::find_with_lock
pub struct SafeList<T> {
  coll: Arc<SafeCollection<T, ListStore<T>>>,
}

impl<T> SafeList<T> {
  /// Creates an empty list.
  pub fn new() -> Self {
    Self {
      coll: Arc::new(SafeCollection::new(ListStore::new())),
    }
  }

  /// Creates an empty list with room for `capacity` elements.
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      coll: Arc::new(SafeCollection::new(ListStore::with_capacity(capacity))),
    }
  }

  /// Appends an element, returning its position at insertion time.
  ///
  /// The position is observable at that moment only; concurrent removals
  /// may shift it.
  pub fn append(&self, value: T) -> usize {
    self.coll.append(value)
  }

  /// Removes the first element equal to `value`.
  ///
  /// O(n): candidates are compared under a short-lived read acquisition
  /// each, outside the container mutex. Returns `false` if no live element
  /// matches.
  pub fn remove(&self, value: &T) -> bool
  where
    T: PartialEq,
  {
    for entry in self.coll.snapshot() {
      if !Self::matches(&entry, value) {
        continue;
      }

      if self.coll.remove_entry(&entry) {
        return true;
      }

      // Lost a race with another remover; some later element may still
      // match.
    }

    false
  }

  /// Removes the element at `index`. Returns `false` if out of range.
  ///
  /// The removed object stays alive for any handle still holding it; it is
  /// reclaimed by a later garbage-collection pass once the last holder
  /// drops.
  pub fn remove_at(&self, index: usize) -> bool {
    self.coll.remove_at(index)
  }

  /// Removes every element.
  pub fn remove_all(&self) {
    self.coll.remove_all();
  }

  /// Binds a handle to the element at `index` in the given mode.
  ///
  /// Blocks while the requested lock is unavailable. Returns `None` if the
  /// index is out of range or the element was removed before the lock was
  /// granted.
  pub fn get_with_lock(&self, index: usize, mode: Mode) -> Option<ListHandle<T>> {
    SafeHandle::bind_index(Arc::clone(&self.coll), index, mode)
  }

  /// Binds a handle to the first element equal to `value`.
  ///
  /// O(n), with one short-lived read acquisition per candidate. Returns
  /// `None` if no live element matches.
  pub fn find_with_lock(&self, value: &T, mode: Mode) -> Option<ListHandle<T>>
  where
    T: PartialEq,
  {
    for (index, entry) in self.coll.snapshot().into_iter().enumerate() {
      if !Self::matches(&entry, value) {
        continue;
      }

      if let Some(handle) =
        SafeHandle::bind_entry(Arc::clone(&self.coll), entry, index, mode)
      {
        return Some(handle);
      }

      // Removed between the comparison and the lock; it no longer counts.
    }

    None
  }

  /// Instantaneous live size. Advisory.
  pub fn len(&self) -> usize {
    self.coll.len()
  }

  /// Returns `true` if no live elements are present. Advisory.
  pub fn is_empty(&self) -> bool {
    self.coll.is_empty()
  }

  /// Number of removed elements awaiting reclamation.
  pub fn pending(&self) -> usize {
    self.coll.pending()
  }

  /// Reclaims removed elements whose last holder has left. Returns the
  /// number reclaimed.
  pub fn collect_garbage(&self) -> usize {
    self.coll.collect_garbage()
  }

  /// Compares an entry's value under a transient read acquisition.
  fn matches(entry: &Entry<T>, value: &T) -> bool
  where
    T: PartialEq,
  {
    if entry.acquire_read().is_err() {
      // Tombstoned: no longer a live element.
      return false;
    }

    // SAFETY: The shared side is held for the duration of the comparison.
    let matches: bool = unsafe { &*entry.value_ptr() } == value;

    entry.release_read();

    matches
  }
}

#[cfg(not(any(loom, shuttle)))]
impl<T> SafeList<T>
where
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

impl<T> Default for SafeList<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Drop for SafeList<T> {
  /// Removes every element and blocks until all outstanding handles have
  /// released and the pending queue has drained.
  ///
  /// Dropping the list on a thread that itself still holds a handle on one
  /// of its elements blocks forever.
  fn drop(&mut self) {
    self.coll.shutdown();
  }
}

impl<T> Debug for SafeList<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("SafeList")
      .field("len", &self.len())
      .field("pending", &self.pending())
      .finish_non_exhaustive()
  }
}
