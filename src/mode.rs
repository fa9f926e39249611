//! Lock strengths and acquire outcomes.

use core::error::Error;
use core::fmt::Display;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;

// -----------------------------------------------------------------------------
// Mode
// -----------------------------------------------------------------------------

/// The strength with which a handle holds its target.
///
/// A handle always owns one protocol reference to its target; the mode
/// determines which lock, if any, it holds on top of that reference.
///
/// - [`Reference`] keeps the object alive but grants no data access.
/// - [`ReadOnly`] additionally holds the shared lock; any number of readers
///   may coexist.
/// - [`ReadWrite`] additionally holds the exclusive lock; no other reader or
///   writer may coexist.
///
/// [`Reference`]: Mode::Reference
/// [`ReadOnly`]: Mode::ReadOnly
/// [`ReadWrite`]: Mode::ReadWrite
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Mode {
  /// Keep the target alive without locking it.
  Reference,
  /// Hold the shared lock for read access.
  ReadOnly,
  /// Hold the exclusive lock for write access.
  ReadWrite,
}

impl Mode {
  /// Returns `true` if this mode holds a read or write lock.
  #[inline]
  pub const fn is_locked(self) -> bool {
    matches!(self, Self::ReadOnly | Self::ReadWrite)
  }
}

impl Display for Mode {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    match self {
      Self::Reference => f.write_str("reference"),
      Self::ReadOnly => f.write_str("read-only"),
      Self::ReadWrite => f.write_str("read-write"),
    }
  }
}

// -----------------------------------------------------------------------------
// Acquire Outcome
// -----------------------------------------------------------------------------

/// Failure to reference or lock an object.
///
/// This is a first-class outcome, not an exceptional condition: any thread
/// may tombstone an object at any time, so every acquire site must be
/// prepared to observe [`Removed`] and abandon the object.
///
/// [`Removed`]: AcquireError::Removed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum AcquireError {
  /// The object is tombstoned. Permanent: no later acquire on the same
  /// object can succeed.
  Removed,
  /// The acquire would block on a lock the source handle itself holds
  /// exclusively, such as assigning from a write-locked handle.
  ///
  /// The lock itself is non-reentrant and cannot detect this on its own;
  /// only the handle layer reports it.
  WouldDeadlock,
}

impl Display for AcquireError {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    match self {
      Self::Removed => f.write_str("object has been removed"),
      Self::WouldDeadlock => f.write_str("acquire would deadlock"),
    }
  }
}

impl Error for AcquireError {}
