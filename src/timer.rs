//! Background driver for periodic garbage collection.
//!
//! Compiled out under loom/shuttle: model checkers have no notion of wall
//! time, and the periodic sweep is plain std threading either way.

use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::thread::Builder;
use std::thread::JoinHandle;
use std::time::Duration;

struct Signal {
  stopped: Mutex<bool>,
  wake: Condvar,
}

/// A repeating background task with a stop switch.
///
/// Runs `tick` every `period` until it returns `false` or the reaper is
/// dropped; dropping signals the thread and joins it.
pub(crate) struct Reaper {
  signal: Arc<Signal>,
  thread: Option<JoinHandle<()>>,
}

impl Reaper {
  pub(crate) fn spawn<F>(period: Duration, mut tick: F) -> Self
  where
    F: FnMut() -> bool + Send + 'static,
  {
    let signal: Arc<Signal> = Arc::new(Signal {
      stopped: Mutex::new(false),
      wake: Condvar::new(),
    });

    let shared: Arc<Signal> = Arc::clone(&signal);

    let thread: JoinHandle<()> = Builder::new()
      .name("safecoll-reaper".into())
      .spawn(move || {
        let mut stopped: MutexGuard<'_, bool> = shared
          .stopped
          .lock()
          .unwrap_or_else(PoisonError::into_inner);

        loop {
          if *stopped {
            return;
          }

          let (guard, timeout) = shared
            .wake
            .wait_timeout(stopped, period)
            .unwrap_or_else(PoisonError::into_inner);

          stopped = guard;

          if *stopped {
            return;
          }

          // Spurious wakeups simply re-park; the sweep runs on timeout.
          if timeout.timed_out() {
            drop(stopped);

            if !tick() {
              return;
            }

            stopped = shared
              .stopped
              .lock()
              .unwrap_or_else(PoisonError::into_inner);
          }
        }
      })
      .expect("failed to spawn reaper thread");

    Self {
      signal,
      thread: Some(thread),
    }
  }
}

impl Drop for Reaper {
  fn drop(&mut self) {
    {
      let mut stopped: MutexGuard<'_, bool> = self
        .signal
        .stopped
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

      *stopped = true;
    }

    self.signal.wake.notify_all();

    if let Some(thread) = self.thread.take() {
      // The thread parks in bounded waits, so the join is bounded too.
      let _joined = thread.join();
    }
  }
}
