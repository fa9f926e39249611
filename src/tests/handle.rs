use crate::handle::SafeHandle;
use crate::list::ListHandle;
use crate::list::SafeList;
use crate::mode::AcquireError;
use crate::mode::Mode;
use crate::object::SafeObject;
use crate::store::Entry;
use crate::sync::Arc;

fn list(values: &[u32]) -> SafeList<u32> {
  let list: SafeList<u32> = SafeList::new();

  for value in values {
    list.append(*value);
  }

  list
}

#[test]
fn test_empty_handle() {
  let mut handle: ListHandle<u32> = SafeHandle::empty();

  assert!(!handle.is_bound());
  assert!(!handle.is_removed());
  assert!(handle.get().is_none());
  assert!(handle.get_mut().is_none());
  assert!(!handle.next());
  assert!(!handle.previous());
  assert!(handle.set_mode(Mode::ReadWrite).is_ok());
}

#[test]
fn test_from_object() {
  let object: Entry<u32> = Arc::new(SafeObject::new(7));

  let handle: ListHandle<u32> = SafeHandle::from_object(&object, Mode::ReadOnly).unwrap();

  assert!(handle.is_bound());
  assert_eq!(handle.get(), Some(&7));
  assert_eq!(object.references(), 1);

  drop(handle);

  assert_eq!(object.references(), 0);
}

#[test]
fn test_from_object_removed() {
  let object: Entry<u32> = Arc::new(SafeObject::new(7));

  object.mark_removed();

  assert!(SafeHandle::<u32>::from_object(&object, Mode::Reference).is_none());
  assert_eq!(object.references(), 0);
}

#[test]
fn test_reference_mode_grants_no_access() {
  let list: SafeList<u32> = list(&[1]);

  let mut handle: ListHandle<u32> = list.get_with_lock(0, Mode::Reference).unwrap();

  assert!(handle.is_bound());
  assert!(handle.get().is_none());
  assert!(handle.get_mut().is_none());
}

#[test]
fn test_read_mode_grants_shared_access() {
  let list: SafeList<u32> = list(&[1]);

  let mut handle: ListHandle<u32> = list.get_with_lock(0, Mode::ReadOnly).unwrap();

  assert_eq!(handle.get(), Some(&1));
  assert!(handle.get_mut().is_none());
}

#[test]
fn test_write_mode_grants_exclusive_access() {
  let list: SafeList<u32> = list(&[1]);

  {
    let mut handle: ListHandle<u32> = list.get_with_lock(0, Mode::ReadWrite).unwrap();

    if let Some(value) = handle.get_mut() {
      *value = 99;
    }
  }

  let handle: ListHandle<u32> = list.get_with_lock(0, Mode::ReadOnly).unwrap();

  assert_eq!(handle.get(), Some(&99));
}

#[test]
fn test_drop_releases_write_lock() {
  let list: SafeList<u32> = list(&[1]);

  let first: ListHandle<u32> = list.get_with_lock(0, Mode::ReadWrite).unwrap();

  drop(first);

  // Would deadlock if the exclusive side leaked.
  let second: ListHandle<u32> = list.get_with_lock(0, Mode::ReadWrite).unwrap();

  assert!(second.is_bound());
}

#[test]
fn test_set_mode_roundtrip() {
  let list: SafeList<u32> = list(&[1]);

  let mut handle: ListHandle<u32> = list.get_with_lock(0, Mode::ReadWrite).unwrap();

  assert!(handle.set_mode(Mode::Reference).is_ok());
  assert!(handle.get().is_none());

  assert!(handle.set_mode(Mode::ReadWrite).is_ok());
  assert_eq!(handle.get(), Some(&1));
}

#[test]
fn test_set_mode_read_to_write() {
  let list: SafeList<u32> = list(&[1]);

  let mut handle: ListHandle<u32> = list.get_with_lock(0, Mode::ReadOnly).unwrap();

  assert!(handle.set_mode(Mode::ReadWrite).is_ok());
  assert_eq!(handle.mode(), Mode::ReadWrite);
  assert!(handle.get_mut().is_some());
}

#[test]
fn test_set_mode_upgrade_fails_on_removed() {
  let list: SafeList<u32> = list(&[1]);

  let mut handle: ListHandle<u32> = list.get_with_lock(0, Mode::Reference).unwrap();

  assert!(list.remove_at(0));
  assert!(handle.is_removed());

  // The reference predates the tombstone and stays valid, but no lock can
  // be taken any more; the handle empties and drops its reference.
  assert_eq!(handle.set_mode(Mode::ReadWrite), Err(AcquireError::Removed));
  assert!(!handle.is_bound());

  assert_eq!(list.collect_garbage(), 1);
}

#[test]
fn test_clone_reference_mode() {
  let list: SafeList<u32> = list(&[1]);

  let first: ListHandle<u32> = list.get_with_lock(0, Mode::Reference).unwrap();
  let second: ListHandle<u32> = first.clone();

  assert!(second.is_bound());
  assert!(list.remove_at(0));

  drop(first);
  assert_eq!(list.collect_garbage(), 0);

  drop(second);
  assert_eq!(list.collect_garbage(), 1);
}

#[test]
fn test_clone_read_mode() {
  let list: SafeList<u32> = list(&[1]);

  let first: ListHandle<u32> = list.get_with_lock(0, Mode::ReadOnly).unwrap();
  let second: ListHandle<u32> = first.clone();

  assert_eq!(first.get(), Some(&1));
  assert_eq!(second.get(), Some(&1));
  assert_eq!(second.mode(), Mode::ReadOnly);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "cloning a write-locked handle")]
fn test_clone_write_mode_asserts() {
  let list: SafeList<u32> = list(&[1]);

  let handle: ListHandle<u32> = list.get_with_lock(0, Mode::ReadWrite).unwrap();
  let _copy: ListHandle<u32> = handle.clone();
}

#[test]
fn test_assign_rebinds() {
  let list: SafeList<u32> = list(&[1, 2]);

  let source: ListHandle<u32> = list.get_with_lock(1, Mode::ReadOnly).unwrap();
  let mut target: ListHandle<u32> = list.get_with_lock(0, Mode::ReadOnly).unwrap();

  assert!(target.assign(&source).is_ok());
  assert_eq!(target.get(), Some(&2));
  assert_eq!(target.mode(), Mode::ReadOnly);
}

#[test]
fn test_assign_from_empty_clears() {
  let list: SafeList<u32> = list(&[1]);

  let source: ListHandle<u32> = SafeHandle::empty();
  let mut target: ListHandle<u32> = list.get_with_lock(0, Mode::ReadOnly).unwrap();

  assert!(target.assign(&source).is_ok());
  assert!(!target.is_bound());
}

#[test]
fn test_assign_failure_leaves_target_untouched() {
  let list: SafeList<u32> = list(&[1, 2]);

  let source: ListHandle<u32> = list.get_with_lock(1, Mode::Reference).unwrap();
  let mut target: ListHandle<u32> = list.get_with_lock(0, Mode::ReadOnly).unwrap();

  assert!(list.remove_at(1));

  // The source's target is tombstoned: the new reference cannot be taken.
  assert_eq!(target.assign(&source), Err(AcquireError::Removed));
  assert_eq!(target.get(), Some(&1));
}

#[test]
fn test_traversal_forward() {
  let list: SafeList<u32> = list(&[1, 2, 3]);

  let mut handle: ListHandle<u32> = list.get_with_lock(0, Mode::ReadOnly).unwrap();
  let mut seen: Vec<u32> = vec![*handle.get().unwrap()];

  while handle.next() {
    seen.push(*handle.get().unwrap());
  }

  assert_eq!(seen, [1, 2, 3]);
  assert!(!handle.is_bound());
}

#[test]
fn test_traversal_backward() {
  let list: SafeList<u32> = list(&[1, 2, 3]);

  let mut handle: ListHandle<u32> = list.get_with_lock(2, Mode::ReadOnly).unwrap();
  let mut seen: Vec<u32> = vec![*handle.get().unwrap()];

  while handle.previous() {
    seen.push(*handle.get().unwrap());
  }

  assert_eq!(seen, [3, 2, 1]);
}

#[test]
fn test_traversal_keeps_mode() {
  let list: SafeList<u32> = list(&[1, 2]);

  let mut handle: ListHandle<u32> = list.get_with_lock(0, Mode::ReadWrite).unwrap();

  assert!(handle.next());
  assert_eq!(handle.mode(), Mode::ReadWrite);

  if let Some(value) = handle.get_mut() {
    *value = 20;
  }

  drop(handle);

  let handle: ListHandle<u32> = list.get_with_lock(1, Mode::ReadOnly).unwrap();

  assert_eq!(handle.get(), Some(&20));
}

#[test]
fn test_traversal_skips_removed_neighbor() {
  let list: SafeList<u32> = list(&[1, 2, 3]);

  let mut handle: ListHandle<u32> = list.get_with_lock(0, Mode::ReadOnly).unwrap();

  assert!(list.remove_at(1));
  assert!(handle.next());

  // The pending element is not visited.
  assert_eq!(handle.get(), Some(&3));
}

#[test]
fn test_traversal_from_removed_current() {
  let list: SafeList<u32> = list(&[1, 2, 3]);

  let mut handle: ListHandle<u32> = list.get_with_lock(1, Mode::Reference).unwrap();

  assert!(list.remove_at(1));
  assert!(handle.next());
  assert!(handle.set_mode(Mode::ReadOnly).is_ok());

  assert_eq!(handle.get(), Some(&3));
}

#[test]
fn test_traversal_from_removed_current_backward() {
  let list: SafeList<u32> = list(&[1, 2, 3]);

  let mut handle: ListHandle<u32> = list.get_with_lock(1, Mode::Reference).unwrap();

  assert!(list.remove_at(1));
  assert!(handle.previous());
  assert!(handle.set_mode(Mode::ReadOnly).is_ok());

  assert_eq!(handle.get(), Some(&1));
}

#[test]
fn test_traversal_off_end_keeps_association() {
  let list: SafeList<u32> = list(&[1]);

  let mut handle: ListHandle<u32> = list.get_with_lock(0, Mode::ReadOnly).unwrap();

  assert!(!handle.next());
  assert!(!handle.is_bound());

  // The element was released by the step off the end.
  assert!(list.remove_at(0));
  assert_eq!(list.collect_garbage(), 1);
}

#[test]
fn test_clear_releases() {
  let list: SafeList<u32> = list(&[1]);

  let mut handle: ListHandle<u32> = list.get_with_lock(0, Mode::ReadWrite).unwrap();

  handle.clear();

  assert!(!handle.is_bound());

  // The exclusive side was handed back.
  let again: ListHandle<u32> = list.get_with_lock(0, Mode::ReadWrite).unwrap();

  assert!(again.is_bound());
}
