//! Owning iterator for `BucketStorage`.

use crate::BucketStorage;

/// An owning iterator over elements of a `BucketStorage`, in insertion
/// order.
///
/// This struct is created by the `into_iter` method on `BucketStorage`
/// (provided by the [`IntoIterator`] trait). Blocks are released as soon as
/// the values they hold have been yielded.
pub struct IntoIter<T> {
    pub(crate) storage: BucketStorage<T>,
}

impl<T> IntoIter<T> {
    /// Creates a new owning iterator from a `BucketStorage`.
    #[inline]
    pub fn new(storage: BucketStorage<T>) -> Self {
        Self { storage }
    }
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.storage.pop_front()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.storage.len();
        (remaining, Some(remaining))
    }

    #[inline]
    fn count(self) -> usize {
        self.storage.len()
    }
}

impl<T> DoubleEndedIterator for IntoIter<T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.storage.pop_back()
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}

impl<T> std::iter::FusedIterator for IntoIter<T> {}

impl<T: Clone> Clone for IntoIter<T> {
    fn clone(&self) -> Self {
        IntoIter {
            storage: self.storage.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for IntoIter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IntoIter").field(&self.storage).finish()
    }
}
