//! Stable positions into a `BucketStorage`.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::virtual_list::OVER_END;

/// Ordering key of the past-the-end cursor.
const END_TIME: u64 = u64::MAX;

/// A position in a [`BucketStorage`](crate::BucketStorage).
///
/// Cursors are plain `Copy` handles: they do not borrow the storage and stay
/// valid across inserts and across erasing *other* elements. Reading or
/// moving through a cursor goes through the storage, which reports a
/// [`StorageError`](crate::StorageError) for cursors whose element has been
/// erased or that came from another storage.
///
/// Cursors compare by insertion timestamp, so for two cursors of the same
/// storage `a < b` means `a` was inserted before `b`, regardless of where
/// either value sits in memory. The end cursor compares greater than every
/// element cursor.
///
/// # Example
///
/// ```
/// use bucket_storage::BucketStorage;
///
/// let mut storage = BucketStorage::new();
/// let a = storage.insert("a");
/// let b = storage.insert("b");
/// assert!(a < b);
/// assert!(b < storage.end());
///
/// storage.erase(a).unwrap();
/// assert_eq!(storage[b], "b");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    pub(crate) storage: u64,
    pub(crate) index: usize,
    pub(crate) time: u64,
}

impl Cursor {
    #[inline]
    pub(crate) const fn element(storage: u64, index: usize, time: u64) -> Self {
        Self {
            storage,
            index,
            time,
        }
    }

    #[inline]
    pub(crate) const fn end(storage: u64) -> Self {
        Self {
            storage,
            index: OVER_END,
            time: END_TIME,
        }
    }

    /// Returns `true` if this is the past-the-end cursor.
    #[inline]
    pub const fn is_end(&self) -> bool {
        self.index == OVER_END
    }
}

impl PartialEq for Cursor {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.storage == other.storage
    }
}

impl Eq for Cursor {}

impl PartialOrd for Cursor {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cursor {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then(self.storage.cmp(&other.storage))
    }
}

impl Hash for Cursor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.storage.hash(state);
        self.time.hash(state);
    }
}
