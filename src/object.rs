//! The per-element safety protocol.
//!
//! A [`SafeObject`] couples three pieces of state:
//!
//! - a guard mutex over the reference count and the tombstone flag, so that
//!   the acquire/removal decision is atomic;
//! - a raw reader/writer lock protecting the user value;
//! - the user value itself.
//!
//! The coupling rule is that the guard is always taken before the lock, and
//! `removed` is re-checked after a blocking lock acquisition, so a
//! tombstone raised between releasing the guard and being granted the lock
//! cannot leak a zombie lock holder.

use core::cell::UnsafeCell;
use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;

use crate::mode::AcquireError;
use crate::rwlock::RawRwLock;
use crate::sync::lock;
use crate::sync::Mutex;
use crate::sync::MutexGuard;

#[derive(Debug)]
struct Meta {
  /// Active protocol references: one per handle, plus transient internal
  /// ones taken during traversal.
  refs: usize,
  /// One-way tombstone. Once set, no new reference or lock succeeds.
  removed: bool,
}

/// A value participating in the reference-count + reader/writer + tombstone
/// protocol.
///
/// `SafeObject` is normally created and owned by a collection; it is shared
/// as `Arc<SafeObject<T>>` between the collection and any handles. The `Arc`
/// keeps the memory valid; the protocol reference count decides when the
/// collection may reclaim the object from its pending queue.
///
/// The protocol operations come in balanced pairs ([`reference`] /
/// [`dereference`], [`acquire_read`] / [`release_read`], [`acquire_write`] /
/// [`release_write`]); handles pair them automatically. Releasing a side
/// that is not held is a misuse and asserts in debug builds.
///
/// [`reference`]: SafeObject::reference
/// [`dereference`]: SafeObject::dereference
/// [`acquire_read`]: SafeObject::acquire_read
/// [`release_read`]: SafeObject::release_read
/// [`acquire_write`]: SafeObject::acquire_write
/// [`release_write`]: SafeObject::release_write
pub struct SafeObject<T> {
  meta: Mutex<Meta>,
  rw: RawRwLock,
  value: UnsafeCell<T>,
}

// SAFETY: The value is only reachable through the reader/writer protocol:
// shared references require the shared side, exclusive references the
// exclusive side. `T: Send` lets the value move with the object; `T: Sync`
// is required for concurrent readers.
unsafe impl<T: Send> Send for SafeObject<T> {}
unsafe impl<T: Send + Sync> Sync for SafeObject<T> {}

impl<T> SafeObject<T> {
  /// Creates an unowned object: zero references, not tombstoned.
  pub fn new(value: T) -> Self {
    Self {
      meta: Mutex::new(Meta {
        refs: 0,
        removed: false,
      }),
      rw: RawRwLock::new(),
      value: UnsafeCell::new(value),
    }
  }

  /// Takes one protocol reference, failing if the object is tombstoned.
  pub fn reference(&self) -> Result<(), AcquireError> {
    let mut meta: MutexGuard<'_, Meta> = lock(&self.meta);

    if meta.removed {
      return Err(AcquireError::Removed);
    }

    meta.refs += 1;

    Ok(())
  }

  /// Drops one protocol reference.
  pub fn dereference(&self) {
    let mut meta: MutexGuard<'_, Meta> = lock(&self.meta);

    debug_assert!(meta.refs > 0, "dereference without a reference");

    meta.refs = meta.refs.saturating_sub(1);
  }

  /// Acquires the shared lock, failing if the object is tombstoned.
  ///
  /// Blocks while a writer holds or awaits the lock. Any number of readers
  /// may hold the shared side at once.
  pub fn acquire_read(&self) -> Result<(), AcquireError> {
    self.acquire(RawRwLock::try_lock_shared, RawRwLock::lock_shared, RawRwLock::unlock_shared)
  }

  /// Releases the shared lock.
  pub fn release_read(&self) {
    self.rw.unlock_shared();
  }

  /// Acquires the exclusive lock, failing if the object is tombstoned.
  ///
  /// Blocks until every reader and writer has left.
  pub fn acquire_write(&self) -> Result<(), AcquireError> {
    self.acquire(RawRwLock::try_lock_exclusive, RawRwLock::lock_exclusive, RawRwLock::unlock_exclusive)
  }

  /// Releases the exclusive lock.
  pub fn release_write(&self) {
    self.rw.unlock_exclusive();
  }

  /// Raises the tombstone. Idempotent; does not wait for lock holders.
  ///
  /// Existing references and lock holders stay valid until they release;
  /// new acquires fail from this point on.
  pub fn mark_removed(&self) {
    let mut meta: MutexGuard<'_, Meta> = lock(&self.meta);

    meta.removed = true;
  }

  /// Returns `true` if the tombstone has been raised.
  pub fn is_removed(&self) -> bool {
    let meta: MutexGuard<'_, Meta> = lock(&self.meta);

    meta.removed
  }

  /// Returns `true` if the object may be destroyed: tombstoned, no
  /// references, and no reader or writer on the lock.
  ///
  /// The lock test is a momentary exclusive acquire that fails fast, so a
  /// holder in either mode keeps the object alive.
  pub fn is_deletable(&self) -> bool {
    let meta: MutexGuard<'_, Meta> = lock(&self.meta);

    if !meta.removed || meta.refs > 0 {
      return false;
    }

    if !self.rw.try_lock_exclusive() {
      return false;
    }

    self.rw.unlock_exclusive();

    true
  }

  /// Advisory snapshot of the protocol reference count.
  pub fn references(&self) -> usize {
    let meta: MutexGuard<'_, Meta> = lock(&self.meta);

    meta.refs
  }

  /// Raw pointer to the protected value.
  ///
  /// Dereferencing is sound only while the caller holds the matching lock
  /// side: shared for `&T`, exclusive for `&mut T`.
  pub(crate) const fn value_ptr(&self) -> *mut T {
    self.value.get()
  }

  /// Consumes the object and returns the value.
  pub fn into_inner(self) -> T {
    self.value.into_inner()
  }

  /// The guard-then-lock acquire protocol, shared by both lock sides.
  fn acquire(
    &self,
    try_lock: fn(&RawRwLock) -> bool,
    lock_slow: fn(&RawRwLock),
    unlock: fn(&RawRwLock),
  ) -> Result<(), AcquireError> {
    let meta: MutexGuard<'_, Meta> = lock(&self.meta);

    if meta.removed {
      return Err(AcquireError::Removed);
    }

    // Fast path: the lock is granted while the guard is still held, so no
    // tombstone can slip in between.
    if try_lock(&self.rw) {
      return Ok(());
    }

    drop(meta);

    lock_slow(&self.rw);

    // The tombstone may have been raised while this thread was parked on
    // the lock; a granted lock on a removed object must be handed back.
    let meta: MutexGuard<'_, Meta> = lock(&self.meta);

    if meta.removed {
      drop(meta);
      unlock(&self.rw);
      return Err(AcquireError::Removed);
    }

    Ok(())
  }
}

impl<T> Debug for SafeObject<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    let meta: MutexGuard<'_, Meta> = lock(&self.meta);

    f.debug_struct("SafeObject")
      .field("refs", &meta.refs)
      .field("removed", &meta.removed)
      .finish_non_exhaustive()
  }
}
