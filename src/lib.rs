//! Thread-safe object collections with reference-counted, lockable handles.
//!
//! `safecoll` lets many threads concurrently add, locate, read, mutate,
//! enumerate, and remove long-lived shared objects held in common
//! containers, without data races, deadlocks, or use-after-free, and without
//! holding a container-wide lock during per-object work.
//!
//! # Overview
//!
//! Three layers cooperate:
//!
//! - [`SafeObject`] gives every element a reference count, a one-way
//!   *removed* tombstone, and a reader/writer lock, combined so that no new
//!   reference or lock can be taken once the tombstone is raised.
//! - [`SafeCollection`] owns the elements plus a pending-deletion queue. A
//!   removed element is tombstoned and parked on that queue, still alive
//!   for anyone holding it, until garbage collection reclaims it after the
//!   last holder leaves.
//! - [`SafeHandle`] packages the acquire/release of the reference and the
//!   lock across arbitrary control flow, and can cursor forwards and
//!   backwards through a collection, skipping concurrently removed
//!   elements.
//!
//! The typed facades [`SafeList`] (positional) and [`SafeDict`] (keyed) are
//! the usual entry points.
//!
//! # Usage
//!
//! ```
//! use safecoll::{Mode, SafeList};
//!
//! let list: SafeList<String> = SafeList::new();
//!
//! let index = list.append("hello".to_string());
//! assert_eq!(index, 0);
//!
//! {
//!   let mut handle = list.get_with_lock(index, Mode::ReadWrite).unwrap();
//!
//!   if let Some(value) = handle.get_mut() {
//!     value.push_str(", world");
//!   }
//! }
//!
//! let handle = list.get_with_lock(0, Mode::ReadOnly).unwrap();
//! assert_eq!(handle.get().map(String::as_str), Some("hello, world"));
//! ```
//!
//! # Modes
//!
//! A handle holds its target in one of three strengths ([`Mode`]):
//! `Reference` keeps the object alive without data access, `ReadOnly` holds
//! the shared lock (any number of readers), `ReadWrite` holds the exclusive
//! lock. Acquires fail with [`AcquireError::Removed`] once the object is
//! tombstoned; that is a normal outcome every caller handles by abandoning
//! the object.
//!
//! # Deferred deletion
//!
//! Removing an element never destroys it on the spot:
//!
//! ```
//! use safecoll::{Mode, SafeList};
//!
//! let list: SafeList<u32> = SafeList::new();
//! list.append(7);
//!
//! let handle = list.get_with_lock(0, Mode::ReadOnly).unwrap();
//!
//! assert!(list.remove_at(0));
//! assert_eq!(list.len(), 0);      // gone from the live set ...
//! assert_eq!(list.pending(), 1);  // ... parked for reclamation
//!
//! assert_eq!(list.collect_garbage(), 0); // the reader keeps it alive
//! drop(handle);
//! assert_eq!(list.collect_garbage(), 1);
//! ```
//!
//! [`set_auto_delete`] runs that sweep periodically on a background thread.
//!
//! # Concurrency
//!
//! All operations are thread-safe. Containers hold their internal mutex
//! only for O(1) structural edits (or O(n) bulk sweeps); element locks are
//! always acquired outside it, so a slow reader never stalls the container.
//!
//! ```no_run
//! use safecoll::{Mode, SafeList};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let list: Arc<SafeList<u64>> = Arc::new(SafeList::new());
//!
//! let handles: Vec<_> = (0..4)
//!   .map(|thread_id| {
//!     let list = Arc::clone(&list);
//!     thread::spawn(move || {
//!       for i in 0..100 {
//!         let index = list.append(thread_id * 1000 + i);
//!         if let Some(handle) = list.get_with_lock(index, Mode::ReadOnly) {
//!           let _sum = handle.get().copied();
//!         }
//!       }
//!     })
//!   })
//!   .collect();
//!
//! for handle in handles {
//!   handle.join().unwrap();
//! }
//! ```
//!
//! # Model checking
//!
//! The synchronization internals are routed through a shim so the crate can
//! be explored with [`loom`] (`--cfg loom`) or [`shuttle`]
//! (`--cfg shuttle`); see `tests/loom.rs`.
//!
//! [`set_auto_delete`]: SafeList::set_auto_delete
//! [`loom`]: https://docs.rs/loom
//! [`shuttle`]: https://docs.rs/shuttle

mod collection;
mod dict;
mod handle;
mod list;
mod mode;
mod object;
mod rwlock;
mod store;

#[cfg(not(any(loom, shuttle)))]
mod timer;

#[cfg(all(test, not(any(loom, shuttle))))]
mod tests;

pub mod implementation {
  #![doc = include_str!("../IMPLEMENTATION.md")]
}

pub use self::collection::SafeCollection;
pub use self::dict::DictHandle;
pub use self::dict::SafeDict;
pub use self::handle::SafeHandle;
pub use self::list::ListHandle;
pub use self::list::SafeList;
pub use self::mode::AcquireError;
pub use self::mode::Mode;
pub use self::object::SafeObject;
pub use self::store::DictStore;
pub use self::store::Entry;
pub use self::store::ListStore;
pub use self::store::Store;

mod sync {
  #[cfg(all(loom, shuttle))]
  compile_error!("cannot use loom and shuttle at once");

  #[cfg(not(any(loom, shuttle)))]
  mod exports {
    pub(crate) use ::std::sync::Arc;
    pub(crate) use ::std::sync::Condvar;
    pub(crate) use ::std::sync::Mutex;
    pub(crate) use ::std::sync::MutexGuard;

    pub(crate) mod atomic {
      pub(crate) use ::core::sync::atomic::AtomicUsize;
      pub(crate) use ::core::sync::atomic::Ordering;
    }

    /// Pause between garbage-collection passes in a drain loop.
    pub(crate) fn backoff() {
      ::std::thread::sleep(::std::time::Duration::from_millis(1));
    }
  }

  #[cfg(loom)]
  mod exports {
    pub(crate) use ::loom::sync::Arc;
    pub(crate) use ::loom::sync::Condvar;
    pub(crate) use ::loom::sync::Mutex;
    pub(crate) use ::loom::sync::MutexGuard;

    pub(crate) mod atomic {
      pub(crate) use ::loom::sync::atomic::AtomicUsize;
      pub(crate) use ::loom::sync::atomic::Ordering;
    }

    pub(crate) fn backoff() {
      ::loom::thread::yield_now();
    }
  }

  #[cfg(shuttle)]
  mod exports {
    pub(crate) use ::shuttle::sync::Arc;
    pub(crate) use ::shuttle::sync::Condvar;
    pub(crate) use ::shuttle::sync::Mutex;
    pub(crate) use ::shuttle::sync::MutexGuard;

    pub(crate) mod atomic {
      pub(crate) use ::shuttle::sync::atomic::AtomicUsize;
      pub(crate) use ::shuttle::sync::atomic::Ordering;
    }

    pub(crate) fn backoff() {
      ::shuttle::thread::yield_now();
    }
  }

  pub(crate) use self::exports::*;

  use ::std::sync::PoisonError;

  /// Poison-transparent lock: a panicked holder must not wedge the
  /// protocol state, which consists of plain counters and flags.
  pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Poison-transparent condition-variable wait.
  pub(crate) fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
  }
}
