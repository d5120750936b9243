//! An insertion-ordered container with block storage and stable cursors.
//!
//! `BucketStorage` keeps values in fixed-size blocks ("buckets") of
//! contiguous memory. Erasing a value frees its slot for the next insert
//! and frees the whole block once it is empty, while a separate linked list
//! of elements keeps iteration in insertion order no matter where a value
//! physically lands.
//!
//! Inserting returns a [`Cursor`]. Cursors stay valid across inserts and
//! across erasing other elements, compare by insertion order, and are
//! checked on use: a cursor whose element is gone is reported as
//! [`StorageError::StaleCursor`] instead of reading freed memory.
//!
//! # Example
//!
//! ```
//! use bucket_storage::BucketStorage;
//!
//! let mut storage: BucketStorage<i32> = BucketStorage::with_bucket_capacity(4);
//! let a = storage.insert(1);
//! let b = storage.insert(2);
//! let c = storage.insert(3);
//!
//! // Erase from the middle, the other cursors keep working
//! let next = storage.erase(b).unwrap();
//! assert_eq!(next, c);
//! assert_eq!(storage[a], 1);
//! assert_eq!(storage[c], 3);
//!
//! // The freed slot is reused, no new block needed
//! storage.insert(4);
//! assert_eq!(storage.capacity(), 4);
//! assert_eq!(storage.iter().copied().collect::<Vec<_>>(), vec![1, 3, 4]);
//! ```

mod block;
mod cursor;
mod error;
mod into_iter;
mod iter;
mod physical;
mod stack;
mod virtual_list;

pub use cursor::Cursor;
pub use error::{StorageError, TryInsertError, TryReserveError};
pub use into_iter::IntoIter;
pub use iter::{Iter, IterMut};

use iter::RawIter;
use physical::PhysicalMemory;
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicU64, Ordering};
use virtual_list::{VirtualList, OVER_END};

/// Bucket capacity used by [`BucketStorage::new`].
pub const DEFAULT_BUCKET_CAPACITY: usize = 64;

static NEXT_STORAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity stamped into cursors so they can be matched to their storage.
fn next_storage_id() -> u64 {
    NEXT_STORAGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// An insertion-ordered container storing values in fixed-size blocks.
///
/// # Memory Layout
///
/// Values live in blocks of `bucket_capacity` slots. New values go to the
/// most recently freed-into block that still has room, reusing released
/// slots before untouched ones; a new block is allocated only when no block
/// has room. A block is freed as soon as its last value is erased, so
/// `capacity()` is always `bucket_capacity * block_count()`.
///
/// Iteration order is insertion order and is tracked separately from
/// physical placement.
pub struct BucketStorage<T> {
    /// Blocks and slot recycling
    pub(crate) physical: PhysicalMemory<T>,
    /// Insertion order
    pub(crate) list: VirtualList,
    /// Number of live values
    len: usize,
    /// Identity carried by cursors
    id: u64,
}

impl<T> BucketStorage<T> {
    /// Creates an empty storage with [`DEFAULT_BUCKET_CAPACITY`] slots per
    /// block.
    ///
    /// Does not allocate until a value is inserted.
    ///
    /// # Example
    ///
    /// ```
    /// use bucket_storage::BucketStorage;
    /// let storage: BucketStorage<i32> = BucketStorage::new();
    /// assert!(storage.is_empty());
    /// assert_eq!(storage.bucket_capacity(), 64);
    /// ```
    #[inline]
    pub fn new() -> Self {
        Self::with_bucket_capacity(DEFAULT_BUCKET_CAPACITY)
    }

    /// Creates an empty storage with `bucket_capacity` slots per block.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_capacity` is 0.
    ///
    /// # Example
    ///
    /// ```
    /// use bucket_storage::BucketStorage;
    /// let mut storage = BucketStorage::with_bucket_capacity(8);
    /// storage.insert('x');
    /// assert_eq!(storage.capacity(), 8);
    /// ```
    pub fn with_bucket_capacity(bucket_capacity: usize) -> Self {
        assert!(bucket_capacity > 0, "bucket capacity must be > 0");
        Self {
            physical: PhysicalMemory::new(bucket_capacity),
            list: VirtualList::new(),
            len: 0,
            id: next_storage_id(),
        }
    }

    /// Returns the number of values in the storage.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the storage holds no values.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of slots across all allocated blocks, used or not.
    ///
    /// This is allocated capacity, not a bound: inserting past it allocates
    /// another block.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.physical.capacity()
    }

    /// Returns the number of slots per block.
    #[inline]
    pub const fn bucket_capacity(&self) -> usize {
        self.physical.bucket_capacity()
    }

    /// Returns the number of allocated blocks.
    #[inline]
    pub const fn block_count(&self) -> usize {
        self.physical.block_count()
    }

    /// Inserts a value at the end of the insertion order.
    ///
    /// # Panics
    ///
    /// Aborts via [`std::alloc::handle_alloc_error`] if a new block cannot be
    /// allocated. Use [`try_insert`](Self::try_insert) to handle that case.
    ///
    /// # Example
    ///
    /// ```
    /// use bucket_storage::BucketStorage;
    /// let mut storage = BucketStorage::new();
    /// let c = storage.insert(10);
    /// assert_eq!(storage.get(c), Some(&10));
    /// ```
    pub fn insert(&mut self, value: T) -> Cursor {
        match self.try_insert(value) {
            Ok(cursor) => cursor,
            Err(err) => match err.reserve_error().layout() {
                Some(layout) => std::alloc::handle_alloc_error(layout),
                None => panic!("bucket capacity overflow"),
            },
        }
    }

    /// Inserts a value, reporting allocation failure instead of aborting.
    ///
    /// On failure the value is returned inside the error and the storage is
    /// unchanged.
    pub fn try_insert(&mut self, value: T) -> Result<Cursor, TryInsertError<T>> {
        // Reserve the node first so nothing can fail once the value is placed.
        if let Err(err) = self.list.try_reserve(1) {
            return Err(TryInsertError::new(value, err));
        }
        let (block, position) = self.physical.try_acquire_slot(value)?;
        let index = self.list.append(block, position);
        self.len += 1;
        Ok(self.cursor_at(index))
    }

    /// Inserts the value produced by `f`.
    ///
    /// `f` runs before the storage is touched, so if it panics the storage
    /// is left exactly as it was.
    pub fn insert_with<F>(&mut self, f: F) -> Cursor
    where
        F: FnOnce() -> T,
    {
        let value = f();
        self.insert(value)
    }

    /// Inserts the value produced by a fallible constructor.
    ///
    /// A constructor error is returned unchanged and the storage is left
    /// exactly as it was.
    ///
    /// # Example
    ///
    /// ```
    /// use bucket_storage::BucketStorage;
    /// let mut storage: BucketStorage<u8> = BucketStorage::new();
    /// let err = storage.try_insert_with(|| "300".parse::<u8>());
    /// assert!(err.is_err());
    /// assert!(storage.is_empty());
    /// assert_eq!(storage.capacity(), 0);
    /// ```
    pub fn try_insert_with<F, E>(&mut self, f: F) -> Result<Cursor, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let value = f()?;
        Ok(self.insert(value))
    }

    /// Erases the element at `cursor` and returns a cursor to the element
    /// after it (or the end cursor).
    ///
    /// Erasing the end cursor does nothing and returns the end cursor.
    ///
    /// # Errors
    ///
    /// [`StorageError::StaleCursor`] if the element was already erased,
    /// [`StorageError::ForeignCursor`] if the cursor belongs to another
    /// storage. The storage is unchanged in both cases.
    pub fn erase(&mut self, cursor: Cursor) -> Result<Cursor, StorageError> {
        let index = self.validate(cursor)?;
        if index == OVER_END {
            return Ok(self.end());
        }
        let (value, next) = self.take_node(index);
        let next = self.cursor_at(next);
        // Dropped last so a panicking Drop sees a consistent storage.
        drop(value);
        Ok(next)
    }

    /// Removes the element at `cursor` and returns its value.
    ///
    /// # Errors
    ///
    /// As [`erase`](Self::erase), plus [`StorageError::EndCursor`] for the
    /// end cursor.
    pub fn remove(&mut self, cursor: Cursor) -> Result<T, StorageError> {
        match self.validate(cursor)? {
            OVER_END => Err(StorageError::EndCursor),
            index => Ok(self.take_node(index).0),
        }
    }

    /// Removes and returns the first value in insertion order.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.list.is_empty() {
            return None;
        }
        Some(self.take_node(self.list.start()).0)
    }

    /// Removes and returns the last value in insertion order.
    pub fn pop_back(&mut self) -> Option<T> {
        if self.list.is_empty() {
            return None;
        }
        Some(self.take_node(self.list.end()).0)
    }

    /// Unlinks node `index` and moves its value out of its slot.
    fn take_node(&mut self, index: usize) -> (T, usize) {
        let node = self.list.unlink(index);
        // Safety: a linked node always names a live slot
        let value = unsafe { self.physical.release_slot(node.block, node.position) };
        self.len -= 1;
        (value, node.next)
    }

    /// Cursor to the first element, or the end cursor if empty.
    #[inline]
    pub fn begin(&self) -> Cursor {
        self.cursor_at(self.list.start())
    }

    /// The past-the-end cursor.
    #[inline]
    pub fn end(&self) -> Cursor {
        Cursor::end(self.id)
    }

    #[inline]
    fn cursor_at(&self, index: usize) -> Cursor {
        if index == OVER_END {
            self.end()
        } else {
            Cursor::element(self.id, index, self.list.node(index).time)
        }
    }

    /// Checks that `cursor` is usable here and returns its node index
    /// (`OVER_END` for the end cursor).
    fn validate(&self, cursor: Cursor) -> Result<usize, StorageError> {
        if cursor.storage != self.id {
            return Err(StorageError::ForeignCursor);
        }
        if cursor.is_end() {
            return Ok(OVER_END);
        }
        if self.list.is_live(cursor.index, cursor.time) {
            Ok(cursor.index)
        } else {
            Err(StorageError::StaleCursor)
        }
    }

    /// Returns `true` if `cursor` refers to a live element of this storage.
    pub fn contains_cursor(&self, cursor: Cursor) -> bool {
        matches!(self.validate(cursor), Ok(index) if index != OVER_END)
    }

    /// Returns a reference to the value at `cursor`, or `None` if the cursor
    /// is the end cursor, stale, or from another storage.
    pub fn get(&self, cursor: Cursor) -> Option<&T> {
        match self.validate(cursor) {
            Ok(index) if index != OVER_END => {
                let node = self.list.node(index);
                // Safety: validated live node
                Some(unsafe { self.physical.get(node.block, node.position) })
            }
            _ => None,
        }
    }

    /// Returns a mutable reference to the value at `cursor`, or `None` if
    /// the cursor is the end cursor, stale, or from another storage.
    pub fn get_mut(&mut self, cursor: Cursor) -> Option<&mut T> {
        match self.validate(cursor) {
            Ok(index) if index != OVER_END => {
                let node = *self.list.node(index);
                // Safety: validated live node
                Some(unsafe { self.physical.get_mut(node.block, node.position) })
            }
            _ => None,
        }
    }

    /// Returns the first value in insertion order.
    pub fn front(&self) -> Option<&T> {
        self.get(self.begin())
    }

    /// Returns the first value in insertion order, mutably.
    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.get_mut(self.begin())
    }

    /// Returns the last value in insertion order.
    pub fn back(&self) -> Option<&T> {
        if self.list.is_empty() {
            return None;
        }
        self.get(self.cursor_at(self.list.end()))
    }

    /// Returns the last value in insertion order, mutably.
    pub fn back_mut(&mut self) -> Option<&mut T> {
        if self.list.is_empty() {
            return None;
        }
        self.get_mut(self.cursor_at(self.list.end()))
    }

    /// Returns the cursor after `cursor`.
    ///
    /// # Errors
    ///
    /// [`StorageError::OutOfRange`] if `cursor` is the end cursor, plus the
    /// validation errors of [`erase`](Self::erase).
    pub fn next(&self, cursor: Cursor) -> Result<Cursor, StorageError> {
        self.get_to_distance(cursor, 1)
    }

    /// Returns the cursor before `cursor`. `prev(end())` is the last element.
    ///
    /// # Errors
    ///
    /// [`StorageError::OutOfRange`] if `cursor` is the first element (or the
    /// end cursor of an empty storage).
    pub fn prev(&self, cursor: Cursor) -> Result<Cursor, StorageError> {
        self.get_to_distance(cursor, -1)
    }

    /// Moves `cursor` forward `distance` elements, or backward if `distance`
    /// is negative.
    ///
    /// The end cursor is reachable, stepping beyond it or before the first
    /// element is an error and leaves nothing half-moved.
    ///
    /// # Example
    ///
    /// ```
    /// use bucket_storage::{BucketStorage, StorageError};
    /// let storage: BucketStorage<i32> = (0..5).collect();
    ///
    /// let third = storage.get_to_distance(storage.begin(), 2).unwrap();
    /// assert_eq!(storage[third], 2);
    /// let first = storage.get_to_distance(third, -2).unwrap();
    /// assert_eq!(first, storage.begin());
    /// assert_eq!(storage.get_to_distance(storage.begin(), 5), Ok(storage.end()));
    /// assert_eq!(
    ///     storage.get_to_distance(storage.begin(), -1),
    ///     Err(StorageError::OutOfRange { distance: -1 })
    /// );
    /// ```
    pub fn get_to_distance(
        &self,
        cursor: Cursor,
        distance: isize,
    ) -> Result<Cursor, StorageError> {
        let mut index = self.validate(cursor)?;
        let out_of_range = StorageError::OutOfRange { distance };

        if distance >= 0 {
            for _ in 0..distance {
                if index == OVER_END {
                    return Err(out_of_range);
                }
                index = self.list.node(index).next;
            }
        } else {
            for _ in 0..distance.unsigned_abs() {
                index = self.list.node(index).prev;
                if index == block::NIL {
                    return Err(out_of_range);
                }
            }
        }

        Ok(self.cursor_at(index))
    }

    /// Removes all values.
    ///
    /// Every block is freed, so `capacity()` drops to 0. The bucket capacity
    /// setting is kept. Cursors taken before the call become stale.
    pub fn clear(&mut self) {
        let released = self.capacity();
        while !self.list.is_empty() {
            let (value, _) = self.take_node(self.list.start());
            drop(value);
        }
        self.list.reset();
        self.physical.clear_free_blocks();
        tracing::debug!(released, "cleared bucket storage");
    }

    /// Keeps only the values for which `f` returns `true`, visiting them in
    /// insertion order.
    ///
    /// # Example
    ///
    /// ```
    /// use bucket_storage::BucketStorage;
    /// let mut storage: BucketStorage<i32> = (0..10).collect();
    /// storage.retain(|x| x % 3 == 0);
    /// assert_eq!(storage.iter().copied().collect::<Vec<_>>(), vec![0, 3, 6, 9]);
    /// ```
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&T) -> bool,
    {
        let mut index = self.list.start();
        while index != OVER_END {
            let node = *self.list.node(index);
            // Safety: linked node
            let keep = f(unsafe { self.physical.get(node.block, node.position) });
            if !keep {
                let (value, _) = self.take_node(index);
                drop(value);
            }
            index = node.next;
        }
        // Bulk removal can bury entries for freed blocks
        self.physical.compact_free_blocks();
    }

    /// Repacks the values into as few blocks as possible, keeping their
    /// order.
    ///
    /// Values get new positions and new timestamps, so cursors taken before
    /// the call become stale.
    ///
    /// # Panics
    ///
    /// Aborts via [`std::alloc::handle_alloc_error`] if the new blocks cannot
    /// be allocated. Use [`try_shrink_to_fit`](Self::try_shrink_to_fit) to
    /// handle that case.
    pub fn shrink_to_fit(&mut self) {
        if let Err(err) = self.try_shrink_to_fit() {
            match err.layout() {
                Some(layout) => std::alloc::handle_alloc_error(layout),
                None => panic!("bucket capacity overflow"),
            }
        }
    }

    /// Repacks the values into as few blocks as possible, keeping their
    /// order.
    ///
    /// Every block the packed storage needs is allocated before any value
    /// moves. If that fails the storage is left untouched.
    ///
    /// # Example
    ///
    /// ```
    /// use bucket_storage::BucketStorage;
    /// let mut storage = BucketStorage::with_bucket_capacity(4);
    /// let cursors: Vec<_> = (0..16).map(|i| storage.insert(i)).collect();
    /// for c in cursors.iter().step_by(2) {
    ///     storage.erase(*c).unwrap();
    /// }
    /// assert_eq!(storage.capacity(), 16);
    ///
    /// storage.try_shrink_to_fit().unwrap();
    /// assert_eq!(storage.capacity(), 8);
    /// assert_eq!(
    ///     storage.iter().copied().collect::<Vec<_>>(),
    ///     vec![1, 3, 5, 7, 9, 11, 13, 15]
    /// );
    /// ```
    pub fn try_shrink_to_fit(&mut self) -> Result<(), TryReserveError> {
        let before = self.capacity();
        self.try_repack(self.bucket_capacity())?;
        tracing::debug!(before, after = self.capacity(), "shrank bucket storage");
        Ok(())
    }

    /// Moves every value, in order, into freshly reserved blocks of
    /// `bucket_capacity` slots. Nothing moves unless every allocation
    /// succeeds.
    fn try_repack(&mut self, bucket_capacity: usize) -> Result<(), TryReserveError> {
        let mut packed = Self {
            physical: PhysicalMemory::new(bucket_capacity),
            list: VirtualList::starting_at(self.list.next_time()),
            len: 0,
            id: self.id,
        };
        packed
            .physical
            .try_reserve_blocks(self.len.div_ceil(bucket_capacity))?;
        packed.list.try_reserve(self.len)?;

        while let Some(value) = self.pop_front() {
            packed.insert(value);
        }
        std::mem::swap(self, &mut packed);
        Ok(())
    }

    /// Exchanges the contents of two storages. Cursors follow their elements.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Moves the contents out, leaving `self` empty with no blocks and the
    /// same bucket capacity.
    ///
    /// Cursors taken before the call refer to the returned storage.
    ///
    /// # Example
    ///
    /// ```
    /// use bucket_storage::BucketStorage;
    /// let mut a: BucketStorage<i32> = (0..3).collect();
    /// let c = a.begin();
    /// let b = a.take();
    /// assert!(a.is_empty());
    /// assert_eq!(a.capacity(), 0);
    /// assert_eq!(b[c], 0);
    /// ```
    pub fn take(&mut self) -> Self {
        let empty = Self::with_bucket_capacity(self.bucket_capacity());
        std::mem::replace(self, empty)
    }

    /// Returns an iterator over the values in insertion order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            storage: self,
            raw: RawIter::new(&self.list, self.len),
        }
    }

    /// Returns an iterator over mutable references in insertion order.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        let raw = RawIter::new(&self.list, self.len);
        IterMut { storage: self, raw }
    }

    /// Drops every value without touching the order list or the blocks.
    fn drop_values(&mut self) {
        let mut index = self.list.start();
        while index != OVER_END {
            let node = *self.list.node(index);
            // Safety: linked node, each visited once
            unsafe {
                std::ptr::drop_in_place(self.physical.slot_ptr(node.block, node.position));
            }
            index = node.next;
        }
    }
}

// Trait implementations
impl<T> Drop for BucketStorage<T> {
    fn drop(&mut self) {
        if std::mem::needs_drop::<T>() {
            self.drop_values();
        }
        // PhysicalMemory frees the blocks when it drops
    }
}

impl<T: Clone> Clone for BucketStorage<T> {
    /// Clones the values in insertion order into a fresh storage with the
    /// same bucket capacity.
    ///
    /// The clone has its own identity: cursors of `self` do not work on it.
    fn clone(&self) -> Self {
        let mut new_storage = Self::with_bucket_capacity(self.bucket_capacity());
        for value in self.iter() {
            new_storage.insert(value.clone());
        }
        new_storage
    }
}

impl<T: PartialEq> PartialEq for BucketStorage<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for BucketStorage<T> {}

impl<T: std::hash::Hash> std::hash::Hash for BucketStorage<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_usize(self.len);
        for value in self.iter() {
            value.hash(state);
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for BucketStorage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Default for BucketStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<Cursor> for BucketStorage<T> {
    type Output = T;

    fn index(&self, cursor: Cursor) -> &Self::Output {
        self.get(cursor).expect("cursor does not refer to a live element")
    }
}

impl<T> IndexMut<Cursor> for BucketStorage<T> {
    fn index_mut(&mut self, cursor: Cursor) -> &mut Self::Output {
        self.get_mut(cursor)
            .expect("cursor does not refer to a live element")
    }
}

impl<T> Extend<T> for BucketStorage<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}

impl<'a, T: Clone + 'a> Extend<&'a T> for BucketStorage<T> {
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item.clone());
        }
    }
}

impl<T> FromIterator<T> for BucketStorage<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut storage = Self::new();
        storage.extend(iter);
        storage
    }
}

impl<T> IntoIterator for BucketStorage<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter::new(self)
    }
}

impl<'a, T> IntoIterator for &'a BucketStorage<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut BucketStorage<T> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
