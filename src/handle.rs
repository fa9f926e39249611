//! Scoped handles combining a reference with an optional lock.

use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use std::thread;
use std::thread::ThreadId;

use crate::collection::Direction;
use crate::collection::SafeCollection;
use crate::mode::AcquireError;
use crate::mode::Mode;
use crate::store::Entry;
use crate::store::ListStore;
use crate::store::Store;
use crate::sync::Arc;

/// A scoped holder of one reference and at most one lock on a
/// [`SafeObject`], optionally cursoring within a [`SafeCollection`].
///
/// Construction acquires the reference and, depending on [`Mode`], the
/// shared or exclusive lock; dropping the handle releases both, whatever
/// path the control flow took. While the handle is bound in a locked mode,
/// [`get`] (and, for [`ReadWrite`], [`get_mut`]) expose the protected
/// value.
///
/// # Traversal
///
/// A handle obtained from a collection can cursor through it with
/// [`next`] and [`previous`]. Each step releases the current element,
/// captures the neighbor under the collection mutex, and locks it outside
/// that mutex; neighbors tombstoned in the window are skipped. Stepping off
/// either end empties the handle but keeps the collection association.
///
/// # Thread affinity
///
/// A handle may be *moved* to another thread in any mode (the lock state is
/// not thread-owned, so releasing elsewhere is fine). *Copying* or
/// *assigning* from a handle that holds a lock is only permitted on its
/// owning thread, and never from a [`ReadWrite`] handle (the lock is
/// non-reentrant). Violations assert in debug builds.
///
/// [`SafeObject`]: crate::SafeObject
/// [`get`]: SafeHandle::get
/// [`get_mut`]: SafeHandle::get_mut
/// [`next`]: SafeHandle::next
/// [`previous`]: SafeHandle::previous
/// [`Reference`]: Mode::Reference
/// [`ReadWrite`]: Mode::ReadWrite
pub struct SafeHandle<T, S = ListStore<T>>
where
  S: Store<T>,
{
  coll: Option<Arc<SafeCollection<T, S>>>,
  target: Option<Entry<T>>,
  mode: Mode,
  /// Last known position of `target` within the collection, used to
  /// resynchronize traversal after a concurrent removal of the target.
  pos: usize,
  /// Thread that created the handle; backs the affinity assertions.
  owner: ThreadId,
}

impl<T, S> SafeHandle<T, S>
where
  S: Store<T>,
{
  /// Creates an unbound handle with no collection association.
  pub fn empty() -> Self {
    Self {
      coll: None,
      target: None,
      mode: Mode::Reference,
      pos: 0,
      owner: thread::current().id(),
    }
  }

  /// Binds to a standalone object in the given mode.
  ///
  /// Returns `None` if the object is tombstoned (or, for locked modes, was
  /// tombstoned while this thread awaited the lock). The resulting handle
  /// has no collection association and cannot traverse.
  pub fn from_object(object: &Entry<T>, mode: Mode) -> Option<Self> {
    Self::enter(object, mode, false).ok()?;

    Some(Self {
      coll: None,
      target: Some(Arc::clone(object)),
      mode,
      pos: 0,
      owner: thread::current().id(),
    })
  }

  /// Binds to the element at `index` of `coll` in the given mode.
  pub(crate) fn bind_index(
    coll: Arc<SafeCollection<T, S>>,
    index: usize,
    mode: Mode,
  ) -> Option<Self> {
    let entry: Entry<T> = coll.entry_at(index)?;

    Self::bind_entry(coll, entry, index, mode)
  }

  /// Binds to a known element of `coll` in the given mode.
  pub(crate) fn bind_entry(
    coll: Arc<SafeCollection<T, S>>,
    entry: Entry<T>,
    pos: usize,
    mode: Mode,
  ) -> Option<Self> {
    Self::enter(&entry, mode, false).ok()?;

    Some(Self {
      coll: Some(coll),
      target: Some(entry),
      mode,
      pos,
      owner: thread::current().id(),
    })
  }

  /// Returns `true` if the handle is bound to an object.
  pub fn is_bound(&self) -> bool {
    self.target.is_some()
  }

  /// The lock strength held while bound.
  pub fn mode(&self) -> Mode {
    self.mode
  }

  /// Returns `true` if the bound object has been tombstoned.
  ///
  /// A handle taken before removal stays valid afterwards; this is how it
  /// observes that the object is on its way out. Unbound handles return
  /// `false`.
  pub fn is_removed(&self) -> bool {
    self.target.as_ref().is_some_and(|entry| entry.is_removed())
  }

  /// Shared access to the protected value.
  ///
  /// Returns `None` while unbound or in [`Mode::Reference`] (a bare
  /// reference keeps the object alive but grants no data access).
  pub fn get(&self) -> Option<&T> {
    let entry: &Entry<T> = self.target.as_ref()?;

    if !self.mode.is_locked() {
      return None;
    }

    // SAFETY: The handle holds the shared or exclusive side for as long as
    // it stays bound in a locked mode, and every mode-changing method
    // takes `&mut self`, so the lock cannot be released while this
    // borrow lives.
    Some(unsafe { &*entry.value_ptr() })
  }

  /// Exclusive access to the protected value.
  ///
  /// Returns `None` unless the handle is bound in [`Mode::ReadWrite`].
  pub fn get_mut(&mut self) -> Option<&mut T> {
    let entry: &Entry<T> = self.target.as_ref()?;

    if self.mode != Mode::ReadWrite {
      return None;
    }

    // SAFETY: The exclusive side is held, so no other thread can observe
    // the value; `&mut self` makes this the only access through this
    // handle.
    Some(unsafe { &mut *entry.value_ptr() })
  }

  /// Changes the lock strength in place.
  ///
  /// Degrading to [`Reference`] releases the lock and keeps the
  /// reference. Upgrading acquires the lock and can fail with
  /// [`Removed`] if the object was tombstoned in the meantime; the handle
  /// then empties (the reference is dropped). Changing between read and
  /// write strength goes through [`Reference`], so other writers may
  /// interleave in the window.
  ///
  /// On an unbound handle this is a no-op.
  ///
  /// [`Reference`]: Mode::Reference
  /// [`Removed`]: AcquireError::Removed
  pub fn set_mode(&mut self, mode: Mode) -> Result<(), AcquireError> {
    let Some(entry) = self.target.clone() else {
      return Ok(());
    };

    if self.mode == mode {
      return Ok(());
    }

    // Direct read<->write changes would deadlock on the non-reentrant
    // lock; always pass through the unlocked state.
    if self.mode.is_locked() {
      Self::exit(&entry, self.mode, false);
      self.mode = Mode::Reference;
    }

    if mode.is_locked() {
      let locked: Result<(), AcquireError> = match mode {
        Mode::ReadOnly => entry.acquire_read(),
        _ => entry.acquire_write(),
      };

      if let Err(error) = locked {
        entry.dereference();
        self.target = None;
        return Err(error);
      }
    }

    self.mode = mode;

    Ok(())
  }

  /// Rebinds this handle to `other`'s target under `other`'s mode.
  ///
  /// The new binding is acquired first; only on success is the current one
  /// released, so a failed assignment leaves the handle untouched.
  /// Assigning from a [`ReadWrite`] handle would block on its own
  /// exclusive lock and fails with [`WouldDeadlock`] (asserting in debug
  /// builds). Assigning from an unbound handle releases the current
  /// binding and adopts the source's collection association.
  ///
  /// [`ReadWrite`]: Mode::ReadWrite
  /// [`WouldDeadlock`]: AcquireError::WouldDeadlock
  pub fn assign(&mut self, other: &Self) -> Result<(), AcquireError> {
    let Some(entry) = other.target.clone() else {
      self.clear();
      self.coll.clone_from(&other.coll);
      self.pos = other.pos;
      return Ok(());
    };

    debug_assert!(
      other.mode != Mode::ReadWrite,
      "assignment from a write-locked handle"
    );
    debug_assert!(
      !other.mode.is_locked() || other.owner == thread::current().id(),
      "assignment from a locked handle off its owning thread"
    );

    if other.mode == Mode::ReadWrite {
      return Err(AcquireError::WouldDeadlock);
    }

    Self::enter(&entry, other.mode, false)?;

    self.clear();
    self.coll.clone_from(&other.coll);
    self.target = Some(entry);
    self.mode = other.mode;
    self.pos = other.pos;

    Ok(())
  }

  /// Releases the current binding, keeping the collection association.
  pub fn clear(&mut self) {
    if let Some(entry) = self.target.take() {
      Self::exit(&entry, self.mode, true);
    }
  }

  /// Steps to the next element of the associated collection.
  ///
  /// Returns `true` if the handle is bound afterwards. Elements removed
  /// concurrently are skipped; stepping past the last element empties the
  /// handle.
  pub fn next(&mut self) -> bool {
    self.step(Direction::Forward)
  }

  /// Steps to the previous element of the associated collection.
  ///
  /// The backward counterpart of [`next`](SafeHandle::next).
  pub fn previous(&mut self) -> bool {
    self.step(Direction::Backward)
  }

  fn step(&mut self, direction: Direction) -> bool {
    let Some(coll) = self.coll.clone() else {
      return false;
    };

    let Some(mut current) = self.target.take() else {
      return false;
    };

    let mode: Mode = self.mode;

    // Leave the current element entirely before taking the collection
    // mutex; holding an object lock across it would invert the lock
    // order.
    Self::exit(&current, mode, true);

    let mut hint: usize = self.pos;

    loop {
      let Some((neighbor, index)) = coll.step_from(&current, hint, direction) else {
        return false;
      };

      // The neighbor arrives already referenced (taken under the
      // collection mutex); only the lock remains to be acquired.
      match Self::enter(&neighbor, mode, true) {
        Ok(()) => {
          self.target = Some(neighbor);
          self.pos = index;
          return true;
        }
        Err(_) => {
          // Tombstoned between capture and lock: skip it and keep going
          // in the same direction.
          current = neighbor;
          hint = index;
        }
      }
    }
  }

  /// Acquires the reference (unless already owned) and the lock for
  /// `mode`. On lock failure the reference is rolled back, leaving no
  /// partial state.
  fn enter(entry: &Entry<T>, mode: Mode, assume_referenced: bool) -> Result<(), AcquireError> {
    if !assume_referenced {
      entry.reference()?;
    }

    let locked: Result<(), AcquireError> = match mode {
      Mode::Reference => Ok(()),
      Mode::ReadOnly => entry.acquire_read(),
      Mode::ReadWrite => entry.acquire_write(),
    };

    if let Err(error) = locked {
      entry.dereference();
      return Err(error);
    }

    Ok(())
  }

  /// Releases the lock for `mode` and optionally the reference.
  fn exit(entry: &Entry<T>, mode: Mode, dereference: bool) {
    match mode {
      Mode::Reference => {}
      Mode::ReadOnly => entry.release_read(),
      Mode::ReadWrite => entry.release_write(),
    }

    if dereference {
      entry.dereference();
    }
  }
}

impl<T, S> Clone for SafeHandle<T, S>
where
  S: Store<T>,
{
  /// Copies the handle: same target, same mode, one more reference and
  /// (for [`ReadOnly`]) one more shared acquisition.
  ///
  /// Cloning a [`ReadWrite`] handle is a misuse (the exclusive lock is
  /// non-reentrant): debug builds assert, release builds produce an
  /// unbound handle. Cloning a bound handle whose target was tombstoned
  /// also produces an unbound handle.
  ///
  /// Prefer [`Reference`]-mode copies when handing a target to another
  /// thread: a [`ReadOnly`] copy takes a second shared acquisition, which
  /// can block behind a queued writer that is itself blocked on the
  /// original.
  ///
  /// [`Reference`]: Mode::Reference
  /// [`ReadOnly`]: Mode::ReadOnly
  /// [`ReadWrite`]: Mode::ReadWrite
  fn clone(&self) -> Self {
    let mut copy: Self = Self {
      coll: self.coll.clone(),
      target: None,
      mode: self.mode,
      pos: self.pos,
      owner: thread::current().id(),
    };

    let Some(entry) = &self.target else {
      return copy;
    };

    debug_assert!(
      self.mode != Mode::ReadWrite,
      "cloning a write-locked handle"
    );
    debug_assert!(
      !self.mode.is_locked() || self.owner == thread::current().id(),
      "cloning a locked handle off its owning thread"
    );

    if self.mode != Mode::ReadWrite && Self::enter(entry, self.mode, false).is_ok() {
      copy.target = Some(Arc::clone(entry));
    }

    copy
  }
}

impl<T, S> Drop for SafeHandle<T, S>
where
  S: Store<T>,
{
  fn drop(&mut self) {
    self.clear();
  }
}

impl<T, S> Default for SafeHandle<T, S>
where
  S: Store<T>,
{
  fn default() -> Self {
    Self::empty()
  }
}

impl<T, S> Debug for SafeHandle<T, S>
where
  S: Store<T>,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("SafeHandle")
      .field("bound", &self.is_bound())
      .field("mode", &self.mode)
      .field("removed", &self.is_removed())
      .finish_non_exhaustive()
  }
}
