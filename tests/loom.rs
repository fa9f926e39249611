#![cfg(loom)]

use loom::sync::Arc;
use loom::thread;
use loom::thread::JoinHandle;
use std::ops::Deref;

use safecoll::Mode;
use safecoll::SafeDict;
use safecoll::SafeList;

type Read = JoinHandle<Option<usize>>;
type Write = JoinHandle<bool>;
type Remove = JoinHandle<bool>;

type ArcList = Arc<SafeList<usize>>;

struct LoomList {
  inner: ArcList,
}

impl LoomList {
  fn new(values: &[usize]) -> Self {
    let inner: ArcList = Arc::new(SafeList::new());

    for value in values {
      inner.append(*value);
    }

    Self { inner }
  }

  fn spawn_read(&self, index: usize) -> Read {
    let list: ArcList = ArcList::clone(&self.inner);

    thread::spawn(move || {
      let handle = list.get_with_lock(index, Mode::ReadOnly)?;

      handle.get().copied()
    })
  }

  fn spawn_write(&self, index: usize, value: usize) -> Write {
    let list: ArcList = ArcList::clone(&self.inner);

    thread::spawn(move || {
      let Some(mut handle) = list.get_with_lock(index, Mode::ReadWrite) else {
        return false;
      };

      if let Some(slot) = handle.get_mut() {
        *slot = value;
      }

      true
    })
  }

  fn spawn_increment(&self, index: usize) -> Write {
    let list: ArcList = ArcList::clone(&self.inner);

    thread::spawn(move || {
      let Some(mut handle) = list.get_with_lock(index, Mode::ReadWrite) else {
        return false;
      };

      if let Some(slot) = handle.get_mut() {
        *slot += 1;
      }

      true
    })
  }

  fn spawn_remove_at(&self, index: usize) -> Remove {
    let list: ArcList = ArcList::clone(&self.inner);

    thread::spawn(move || list.remove_at(index))
  }
}

impl Deref for LoomList {
  type Target = ArcList;

  #[inline]
  fn deref(&self) -> &Self::Target {
    &self.inner
  }
}

#[test]
fn test_read_vs_remove() {
  loom::model(|| {
    let list: LoomList = LoomList::new(&[123]);

    let reader: Read = list.spawn_read(0);
    let remover: Remove = list.spawn_remove_at(0);

    // Removal always succeeds: the element exists until it is retired.
    assert!(remover.join().unwrap());

    // The reader either locked before the tombstone or found nothing.
    if let Some(value) = reader.join().unwrap() {
      assert_eq!(value, 123);
    }

    // Both threads are done and all handles dropped: exactly one object
    // awaits reclamation.
    assert_eq!(list.len(), 0);
    assert_eq!(list.collect_garbage(), 1);
    assert_eq!(list.pending(), 0);
  });
}

#[test]
fn test_remove_race() {
  loom::model(|| {
    let list: LoomList = LoomList::new(&[123]);

    let remove_a: Remove = list.spawn_remove_at(0);
    let remove_b: Remove = list.spawn_remove_at(0);

    let removed_a: bool = remove_a.join().unwrap();
    let removed_b: bool = remove_b.join().unwrap();

    assert!(removed_a || removed_b, "at least one remove should succeed");
    assert!(removed_a != removed_b, "exactly one remove should succeed");

    assert_eq!(list.collect_garbage(), 1);
  });
}

#[test]
fn test_write_vs_read() {
  loom::model(|| {
    let list: LoomList = LoomList::new(&[1]);

    let writer: Write = list.spawn_write(0, 2);
    let reader: Read = list.spawn_read(0);

    assert!(writer.join().unwrap());

    let value: usize = reader.join().unwrap().unwrap();

    // The reader runs strictly before or strictly after the writer.
    assert!(value == 1 || value == 2, "torn read: {value}");
  });
}

#[test]
fn test_writers_serialize() {
  loom::model(|| {
    let list: LoomList = LoomList::new(&[0]);

    let writer_a: Write = list.spawn_increment(0);
    let writer_b: Write = list.spawn_increment(0);

    assert!(writer_a.join().unwrap());
    assert!(writer_b.join().unwrap());

    let handle = list.get_with_lock(0, Mode::ReadOnly).unwrap();

    // A lost update would leave 1.
    assert_eq!(handle.get(), Some(&2));
  });
}

#[test]
fn test_write_vs_remove() {
  loom::model(|| {
    let list: LoomList = LoomList::new(&[7]);

    let writer: Write = list.spawn_write(0, 8);
    let remover: Remove = list.spawn_remove_at(0);

    assert!(remover.join().unwrap());

    // The writer either completed against the still-live object or was
    // turned away by the tombstone; never half-done.
    let _wrote: bool = writer.join().unwrap();

    assert_eq!(list.collect_garbage(), 1);
    assert_eq!(list.pending(), 0);
  });
}

#[test]
fn test_traversal_vs_remove() {
  loom::model(|| {
    let list: LoomList = LoomList::new(&[1, 2, 3]);

    let walker: JoinHandle<Vec<usize>> = {
      let list: ArcList = ArcList::clone(&list.inner);

      thread::spawn(move || {
        let mut seen: Vec<usize> = Vec::new();

        let Some(mut handle) = list.get_with_lock(0, Mode::ReadOnly) else {
          return seen;
        };

        seen.push(*handle.get().unwrap());

        while handle.next() {
          seen.push(*handle.get().unwrap());
        }

        seen
      })
    };

    let remover: Remove = list.spawn_remove_at(1);

    assert!(remover.join().unwrap());

    let seen: Vec<usize> = walker.join().unwrap();

    // The walk starts at 1, ends at 3, and visits 2 only if it was still
    // live when the cursor passed.
    assert_eq!(seen.first(), Some(&1));
    assert_eq!(seen.last(), Some(&3));
    assert!(seen == [1, 2, 3] || seen == [1, 3], "unexpected walk: {seen:?}");
  });
}

#[test]
fn test_gc_vs_reader() {
  loom::model(|| {
    let list: LoomList = LoomList::new(&[42]);

    let reader: Read = list.spawn_read(0);

    assert!(list.remove_at(0));

    let collector: JoinHandle<usize> = {
      let list: ArcList = ArcList::clone(&list.inner);

      thread::spawn(move || list.collect_garbage())
    };

    let early: usize = collector.join().unwrap();
    let _read: Option<usize> = reader.join().unwrap();
    let late: usize = list.collect_garbage();

    // Reclaimed exactly once, whether the sweep beat the reader or not.
    assert_eq!(early + late, 1);
    assert_eq!(list.pending(), 0);
  });
}

#[test]
fn test_dict_replace_vs_find() {
  loom::model(|| {
    let dict: Arc<SafeDict<&'static str, usize>> = Arc::new(SafeDict::new());

    dict.set_at("k", 1);

    let finder: Read = {
      let dict = Arc::clone(&dict);

      thread::spawn(move || {
        let handle = dict.find_with_lock(&"k", Mode::ReadOnly)?;

        handle.get().copied()
      })
    };

    let replacer: JoinHandle<bool> = {
      let dict = Arc::clone(&dict);

      thread::spawn(move || dict.set_at("k", 2))
    };

    assert!(replacer.join().unwrap());

    // The key is always mapped, so the finder always lands on a value.
    let value: usize = finder.join().unwrap().unwrap();

    assert!(value == 1 || value == 2, "unexpected value: {value}");

    assert_eq!(dict.collect_garbage(), 1);
    assert_eq!(dict.len(), 1);
  });
}
