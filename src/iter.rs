//! Iterator implementations for `BucketStorage`.
//!
//! `Iter` and `IterMut` share one `RawIter`, which walks the virtual order
//! list from both ends and yields arena indices.

use crate::virtual_list::VirtualList;
use crate::BucketStorage;

/// Two-ended walk over live nodes in insertion order.
#[derive(Debug, Clone)]
pub(crate) struct RawIter {
    /// Next node from the front
    front: usize,
    /// Next node from the back
    back: usize,
    /// Nodes not yet yielded from either end
    remaining: usize,
}

impl RawIter {
    #[inline]
    pub(crate) fn new(list: &VirtualList, len: usize) -> Self {
        Self {
            front: list.start(),
            back: list.end(),
            remaining: len,
        }
    }

    #[inline]
    pub(crate) fn next(&mut self, list: &VirtualList) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.front;
        self.front = list.node(index).next;
        self.remaining -= 1;
        Some(index)
    }

    #[inline]
    pub(crate) fn next_back(&mut self, list: &VirtualList) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.back;
        self.back = list.node(index).prev;
        self.remaining -= 1;
        Some(index)
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.remaining
    }
}

/// An iterator over references to elements of a `BucketStorage`, in
/// insertion order.
pub struct Iter<'a, T> {
    pub(crate) storage: &'a BucketStorage<T>,
    pub(crate) raw: RawIter,
}

impl<'a, T> Iter<'a, T> {
    #[inline]
    fn value(&self, index: usize) -> &'a T {
        let storage = self.storage;
        let node = storage.list.node(index);
        // Safety: every node yielded by RawIter is live
        unsafe { storage.physical.get(node.block, node.position) }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let index = self.raw.next(&self.storage.list)?;
        Some(self.value(index))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.raw.remaining();
        (remaining, Some(remaining))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        let index = self.raw.next_back(&self.storage.list)?;
        Some(self.value(index))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> std::iter::FusedIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage,
            raw: self.raw.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

/// An iterator over mutable references to elements of a `BucketStorage`,
/// in insertion order.
pub struct IterMut<'a, T> {
    pub(crate) storage: &'a mut BucketStorage<T>,
    pub(crate) raw: RawIter,
}

impl<'a, T> IterMut<'a, T> {
    #[inline]
    fn value(&mut self, index: usize) -> &'a mut T {
        let node = *self.storage.list.node(index);
        // Safety: every node yielded by RawIter is live and yielded once,
        // so no two returned references alias.
        unsafe { &mut *self.storage.physical.slot_ptr(node.block, node.position) }
    }
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let index = self.raw.next(&self.storage.list)?;
        Some(self.value(index))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.raw.remaining();
        (remaining, Some(remaining))
    }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        let index = self.raw.next_back(&self.storage.list)?;
        Some(self.value(index))
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<T> std::iter::FusedIterator for IterMut<'_, T> {}

impl<T> std::fmt::Debug for IterMut<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterMut")
            .field("remaining", &self.raw.remaining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::BucketStorage;

    #[test]
    fn test_iter_both_ends() {
        let storage: BucketStorage<i32> = (0..10).collect();
        let mut iter = storage.iter();
        assert_eq!(iter.len(), 10);
        assert_eq!(iter.next(), Some(&0));
        assert_eq!(iter.next_back(), Some(&9));
        assert_eq!(iter.next(), Some(&1));
        assert_eq!(iter.len(), 7);

        let rest: Vec<i32> = iter.copied().collect();
        assert_eq!(rest, vec![2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_iter_meets_in_middle() {
        let storage: BucketStorage<i32> = (0..3).collect();
        let mut iter = storage.iter();
        assert_eq!(iter.next_back(), Some(&2));
        assert_eq!(iter.next(), Some(&0));
        assert_eq!(iter.next_back(), Some(&1));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);
    }

    #[test]
    fn test_iter_rev_skips_erased() {
        let mut storage = BucketStorage::with_bucket_capacity(2);
        let cursors: Vec<_> = (0..6).map(|i| storage.insert(i)).collect();
        storage.erase(cursors[1]).unwrap();
        storage.erase(cursors[4]).unwrap();

        let backwards: Vec<i32> = storage.iter().rev().copied().collect();
        assert_eq!(backwards, vec![5, 3, 2, 0]);
    }

    #[test]
    fn test_iter_mut() {
        let mut storage: BucketStorage<i32> = (0..10).collect();
        for item in storage.iter_mut() {
            *item *= 2;
        }
        let collected: Vec<i32> = storage.iter().copied().collect();
        let expected: Vec<i32> = (0..10).map(|x| x * 2).collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_iter_mut_back() {
        let mut storage: BucketStorage<String> =
            ["a", "b", "c"].into_iter().map(String::from).collect();
        if let Some(last) = storage.iter_mut().next_back() {
            last.push('!');
        }
        assert_eq!(storage.back().map(String::as_str), Some("c!"));
    }

    #[test]
    fn test_iter_empty() {
        let storage: BucketStorage<u8> = BucketStorage::new();
        assert_eq!(storage.iter().next(), None);
        assert_eq!(storage.iter().next_back(), None);
        assert_eq!(storage.iter().len(), 0);
    }

    #[test]
    fn test_iter_debug() {
        let storage: BucketStorage<i32> = (1..4).collect();
        assert_eq!(format!("{:?}", storage.iter()), "[1, 2, 3]");
    }
}
