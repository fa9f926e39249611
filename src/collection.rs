//! Container ownership, the pending-deletion queue, and garbage collection.

use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use std::hash::Hash;

#[cfg(not(any(loom, shuttle)))]
use std::time::Duration;

use crate::mode::AcquireError;
use crate::object::SafeObject;
use crate::store::DictStore;
use crate::store::Entry;
use crate::store::ListStore;
use crate::store::Store;
use crate::sync::atomic::AtomicUsize;
use crate::sync::atomic::Ordering::Relaxed;
use crate::sync::backoff;
use crate::sync::lock;
use crate::sync::Arc;
use crate::sync::Mutex;
use crate::sync::MutexGuard;

#[cfg(not(any(loom, shuttle)))]
use crate::timer::Reaper;

/// Traversal direction for [`SafeCollection::step_from`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
  Forward,
  Backward,
}

/// Structural state: every edit of either field happens under one mutex.
struct Shared<T, S> {
  /// The live set, in positional order.
  store: S,
  /// Tombstoned objects awaiting reclamation, in retirement order.
  pending: Vec<Entry<T>>,
}

/// A container owning [`SafeObject`]s and a pending-deletion queue.
///
/// The collection serializes all structural edits (of both the live store
/// and the pending queue) under a single mutex, held only for O(1) edits or
/// O(n) bulk sweeps; no per-object locking or user code ever runs under it.
///
/// Removal is a two-phase affair: removing an element tombstones it and
/// moves it to the pending queue, where it stays alive for any thread still
/// holding it; [`collect_garbage`] later reclaims the entries whose last
/// holder has left. This keeps positional reads stable under concurrent
/// removal.
///
/// `SafeCollection` is shared as `Arc<SafeCollection<T, S>>`; handles bound
/// to it keep it alive, so traversal never dangles.
///
/// [`collect_garbage`]: SafeCollection::collect_garbage
pub struct SafeCollection<T, S>
where
  S: Store<T>,
{
  shared: Mutex<Shared<T, S>>,
  /// Advisory live-set size, maintained under the mutex, read without it.
  live: AtomicUsize,
  #[cfg(not(any(loom, shuttle)))]
  reaper: Mutex<Option<Reaper>>,
}

impl<T, S> SafeCollection<T, S>
where
  S: Store<T>,
{
  /// Creates a collection over an injected store.
  pub fn new(store: S) -> Self {
    Self {
      shared: Mutex::new(Shared {
        store,
        pending: Vec::new(),
      }),
      live: AtomicUsize::new(0),
      #[cfg(not(any(loom, shuttle)))]
      reaper: Mutex::new(None),
    }
  }

  /// Instantaneous snapshot of the live membership size.
  ///
  /// Advisory: may change before the caller can act on it.
  pub fn len(&self) -> usize {
    self.live.load(Relaxed)
  }

  /// Returns `true` if no live elements are present. Advisory.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of tombstoned objects awaiting reclamation.
  pub fn pending(&self) -> usize {
    let shared: MutexGuard<'_, Shared<T, S>> = lock(&self.shared);

    shared.pending.len()
  }

  /// Removes an element by identity.
  ///
  /// Returns `false` if the entry is not in the live set (already removed,
  /// or never inserted here). On success the object is tombstoned and moved
  /// to the pending queue; threads already holding it are unaffected.
  pub fn remove_entry(&self, entry: &Entry<T>) -> bool {
    let mut shared: MutexGuard<'_, Shared<T, S>> = lock(&self.shared);

    let Some(index) = shared.store.position(entry) else {
      return false;
    };

    let detached: Option<Entry<T>> = shared.store.detach(index);

    debug_assert!(detached.is_some());

    if let Some(detached) = detached {
      self.retire(&mut shared, detached);
    }

    true
  }

  /// Removes the element at `index`. Returns `false` if out of range.
  pub fn remove_at(&self, index: usize) -> bool {
    let mut shared: MutexGuard<'_, Shared<T, S>> = lock(&self.shared);

    let Some(detached) = shared.store.detach(index) else {
      return false;
    };

    self.retire(&mut shared, detached);

    true
  }

  /// Removes every live element, retiring all of them to the pending queue.
  pub fn remove_all(&self) {
    let mut shared: MutexGuard<'_, Shared<T, S>> = lock(&self.shared);

    let drained: Vec<Entry<T>> = shared.store.drain();

    for entry in drained {
      self.retire(&mut shared, entry);
    }
  }

  /// Reclaims every pending object whose last holder has left.
  ///
  /// Returns the number of objects reclaimed. Value destructors run after
  /// the collection mutex is released.
  pub fn collect_garbage(&self) -> usize {
    let mut reclaimed: Vec<Entry<T>> = Vec::new();

    {
      let mut shared: MutexGuard<'_, Shared<T, S>> = lock(&self.shared);
      let mut index: usize = 0;

      while index < shared.pending.len() {
        if shared.pending[index].is_deletable() {
          reclaimed.push(shared.pending.remove(index));
        } else {
          index += 1;
        }
      }
    }

    reclaimed.len()
  }

  /// Removes every element and blocks until the pending queue drains.
  ///
  /// Alternates garbage-collection passes with a bounded backoff while any
  /// outstanding holder keeps a pending object alive. Calling this while
  /// the current thread itself holds a handle on one of the elements blocks
  /// forever.
  pub fn shutdown(&self) {
    self.remove_all();

    loop {
      self.collect_garbage();

      let drained: bool = {
        let shared: MutexGuard<'_, Shared<T, S>> = lock(&self.shared);

        shared.pending.is_empty()
      };

      if drained {
        return;
      }

      backoff();
    }
  }

  /// The entry at `index`, if in range. No reference is taken.
  pub(crate) fn entry_at(&self, index: usize) -> Option<Entry<T>> {
    let shared: MutexGuard<'_, Shared<T, S>> = lock(&self.shared);

    shared.store.get(index).map(Arc::clone)
  }

  /// Snapshot of the live set, for scans that must not run under the mutex.
  pub(crate) fn snapshot(&self) -> Vec<Entry<T>> {
    let shared: MutexGuard<'_, Shared<T, S>> = lock(&self.shared);

    let mut entries: Vec<Entry<T>> = Vec::with_capacity(shared.store.len());

    for index in 0..shared.store.len() {
      if let Some(entry) = shared.store.get(index) {
        entries.push(Arc::clone(entry));
      }
    }

    entries
  }

  /// Captures the neighbor of `current` in `direction`, already referenced.
  ///
  /// `current` is located by identity; if it has been concurrently removed
  /// from the live set, `hint` (its last known position) stands in: the
  /// element now at `hint` is the old forward neighbor, the one before it
  /// the backward neighbor. The neighbor's reference is taken while the
  /// mutex is held so it cannot be reclaimed before the caller locks it;
  /// the caller owns that reference from here on.
  pub(crate) fn step_from(
    &self,
    current: &Entry<T>,
    hint: usize,
    direction: Direction,
  ) -> Option<(Entry<T>, usize)> {
    let shared: MutexGuard<'_, Shared<T, S>> = lock(&self.shared);

    let index: Option<usize> = match (shared.store.position(current), direction) {
      (Some(index), Direction::Forward) => index.checked_add(1),
      (Some(index), Direction::Backward) => index.checked_sub(1),
      (None, Direction::Forward) => Some(hint),
      (None, Direction::Backward) => hint.checked_sub(1),
    };

    let index: usize = index?;
    let entry: &Entry<T> = shared.store.get(index)?;

    // Entries in the live set are never tombstoned (retirement happens
    // under this mutex), so the reference cannot fail.
    let referenced: Result<(), AcquireError> = entry.reference();

    debug_assert!(referenced.is_ok());

    referenced.ok()?;

    Some((Arc::clone(entry), index))
  }

  /// Tombstones an entry, drops the collection's reference, and queues it
  /// for reclamation. Caller holds the mutex.
  fn retire(&self, shared: &mut Shared<T, S>, entry: Entry<T>) {
    entry.mark_removed();
    entry.dereference();

    self.live.fetch_sub(1, Relaxed);

    shared.pending.push(entry);
  }
}

// -----------------------------------------------------------------------------
// Sequence operations
// -----------------------------------------------------------------------------

impl<T> SafeCollection<T, ListStore<T>> {
  /// Appends a new element, returning its position at insertion time.
  pub fn append(&self, value: T) -> usize {
    let entry: Entry<T> = Arc::new(SafeObject::new(value));

    // A freshly constructed object cannot be tombstoned.
    let referenced: Result<(), AcquireError> = entry.reference();

    debug_assert!(referenced.is_ok());

    let mut shared: MutexGuard<'_, Shared<T, ListStore<T>>> = lock(&self.shared);

    self.live.fetch_add(1, Relaxed);

    shared.store.append(entry)
  }
}

// -----------------------------------------------------------------------------
// Keyed operations
// -----------------------------------------------------------------------------

impl<K, T> SafeCollection<T, DictStore<K, T>>
where
  K: Hash + Eq,
{
  /// Stores a new element at `key`, retiring any displaced mapping.
  ///
  /// Returns `true` if a previous mapping was displaced.
  pub(crate) fn set_key(&self, key: K, value: T) -> bool {
    let entry: Entry<T> = Arc::new(SafeObject::new(value));

    let referenced: Result<(), AcquireError> = entry.reference();

    debug_assert!(referenced.is_ok());

    let mut shared: MutexGuard<'_, Shared<T, DictStore<K, T>>> = lock(&self.shared);

    self.live.fetch_add(1, Relaxed);

    let Some(displaced) = shared.store.insert_key(key, entry) else {
      return false;
    };

    self.retire(&mut shared, displaced);

    true
  }

  /// Removes the mapping at `key`. Returns `false` if absent.
  pub(crate) fn take_key(&self, key: &K) -> bool {
    let mut shared: MutexGuard<'_, Shared<T, DictStore<K, T>>> = lock(&self.shared);

    let Some(detached) = shared.store.take_key(key) else {
      return false;
    };

    self.retire(&mut shared, detached);

    true
  }

  /// The entry at `key` with its current position. No reference is taken.
  pub(crate) fn entry_for_key(&self, key: &K) -> Option<(Entry<T>, usize)> {
    let shared: MutexGuard<'_, Shared<T, DictStore<K, T>>> = lock(&self.shared);

    shared
      .store
      .get_key(key)
      .map(|(index, entry)| (Arc::clone(entry), index))
  }

  pub(crate) fn has_key(&self, key: &K) -> bool {
    let shared: MutexGuard<'_, Shared<T, DictStore<K, T>>> = lock(&self.shared);

    shared.store.contains_key(key)
  }
}

// -----------------------------------------------------------------------------
// Periodic garbage collection
// -----------------------------------------------------------------------------

#[cfg(not(any(loom, shuttle)))]
impl<T, S> SafeCollection<T, S>
where
  T: Send + Sync + 'static,
  S: Store<T> + Send + 'static,
{
  /// Starts (or restarts) a periodic garbage-collection sweep.
  ///
  /// A background thread reclaims pending objects every `period` until
  /// [`clear_auto_delete`] is called or the collection is dropped. The
  /// thread holds only a weak reference, so it never extends the
  /// collection's lifetime.
  ///
  /// [`clear_auto_delete`]: SafeCollection::clear_auto_delete
  pub fn set_auto_delete(this: &Arc<Self>, period: Duration) {
    let reaper: Reaper = Reaper::spawn(period, {
      let collection = Arc::downgrade(this);

      move || match collection.upgrade() {
        Some(collection) => {
          collection.collect_garbage();
          true
        }
        None => false,
      }
    });

    let mut slot: MutexGuard<'_, Option<Reaper>> = lock(&this.reaper);

    // Replacing the reaper stops the previous thread.
    *slot = Some(reaper);
  }

  /// Stops the periodic sweep, if one is running.
  pub fn clear_auto_delete(&self) {
    let stopped: Option<Reaper> = lock(&self.reaper).take();

    drop(stopped);
  }
}

impl<T, S> Drop for SafeCollection<T, S>
where
  S: Store<T>,
{
  fn drop(&mut self) {
    #[cfg(not(any(loom, shuttle)))]
    {
      let stopped: Option<Reaper> = lock(&self.reaper).take();

      drop(stopped);
    }

    // No handle can outlive the collection (each one holds an `Arc` to
    // it), so by the time this runs the drain cannot block.
    self.shutdown();
  }
}

impl<T, S> Debug for SafeCollection<T, S>
where
  S: Store<T>,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    let pending: usize = self.pending();

    f.debug_struct("SafeCollection")
      .field("len", &self.len())
      .field("pending", &pending)
      .finish_non_exhaustive()
  }
}
