//! Raw reader/writer lock with manual acquire and release.
//!
//! The handle layer must release locks across arbitrary control flow, long
//! after the acquiring stack frame has returned, so this lock exposes plain
//! `lock`/`unlock` entry points instead of RAII guards. It is built on the
//! crate's mutex/condvar shim so that loom and shuttle can explore its
//! interleavings.
//!
//! The lock is **non-reentrant**: a thread that already holds the shared or
//! exclusive side must not acquire again. It is writer-preferring: while a
//! writer is queued, new readers wait.

use crate::sync::lock;
use crate::sync::wait;
use crate::sync::Condvar;
use crate::sync::Mutex;
use crate::sync::MutexGuard;

#[derive(Debug)]
struct State {
  /// Number of threads holding the shared side.
  readers: usize,
  /// Whether a thread holds the exclusive side.
  writer: bool,
  /// Writers blocked in [`RawRwLock::lock_exclusive`].
  queued_writers: usize,
}

#[derive(Debug)]
pub(crate) struct RawRwLock {
  state: Mutex<State>,
  /// Signalled when the exclusive side is released with no queued writers.
  readers: Condvar,
  /// Signalled when the lock becomes free for one queued writer.
  writers: Condvar,
}

impl RawRwLock {
  pub(crate) fn new() -> Self {
    Self {
      state: Mutex::new(State {
        readers: 0,
        writer: false,
        queued_writers: 0,
      }),
      readers: Condvar::new(),
      writers: Condvar::new(),
    }
  }

  /// Acquires the shared side without blocking, returning `false` if a
  /// writer holds or awaits the lock.
  pub(crate) fn try_lock_shared(&self) -> bool {
    let mut state: MutexGuard<'_, State> = lock(&self.state);

    if state.writer || state.queued_writers > 0 {
      return false;
    }

    state.readers += 1;

    true
  }

  /// Acquires the shared side, blocking while a writer holds or awaits the
  /// lock.
  pub(crate) fn lock_shared(&self) {
    let mut state: MutexGuard<'_, State> = lock(&self.state);

    while state.writer || state.queued_writers > 0 {
      state = wait(&self.readers, state);
    }

    state.readers += 1;
  }

  /// Releases the shared side.
  ///
  /// Must be called exactly once per successful shared acquire.
  pub(crate) fn unlock_shared(&self) {
    let mut state: MutexGuard<'_, State> = lock(&self.state);

    debug_assert!(state.readers > 0, "unlock_shared without a reader");
    debug_assert!(!state.writer, "reader and writer held at once");

    state.readers -= 1;

    if state.readers == 0 {
      // Only a queued writer can be waiting: readers never wait on readers.
      self.writers.notify_one();
    }
  }

  /// Acquires the exclusive side without blocking, returning `false` if any
  /// holder exists.
  pub(crate) fn try_lock_exclusive(&self) -> bool {
    let mut state: MutexGuard<'_, State> = lock(&self.state);

    if state.writer || state.readers > 0 {
      return false;
    }

    state.writer = true;

    true
  }

  /// Acquires the exclusive side, blocking until all holders have left.
  pub(crate) fn lock_exclusive(&self) {
    let mut state: MutexGuard<'_, State> = lock(&self.state);

    state.queued_writers += 1;

    while state.writer || state.readers > 0 {
      state = wait(&self.writers, state);
    }

    state.queued_writers -= 1;
    state.writer = true;
  }

  /// Releases the exclusive side.
  ///
  /// Must be called exactly once per successful exclusive acquire.
  pub(crate) fn unlock_exclusive(&self) {
    let mut state: MutexGuard<'_, State> = lock(&self.state);

    debug_assert!(state.writer, "unlock_exclusive without a writer");
    debug_assert!(state.readers == 0, "reader and writer held at once");

    state.writer = false;

    if state.queued_writers > 0 {
      self.writers.notify_one();
    } else {
      self.readers.notify_all();
    }
  }
}
