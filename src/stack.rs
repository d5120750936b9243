//! LIFO pool used for slot and block recycling.

use crate::TryReserveError;

/// Error returned when popping from an empty [`Stack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("pop from an empty stack")]
pub(crate) struct StackUnderflow;

/// Last-in-first-out pool of `Copy` values.
///
/// Blocks use one to hand out recently freed positions before touching
/// never-used slots, and the physical allocator uses one to track which
/// blocks still accept inserts.
#[derive(Debug, Clone)]
pub(crate) struct Stack<X> {
    items: Vec<X>,
}

impl<X: Copy> Stack<X> {
    #[inline]
    pub(crate) const fn new() -> Self {
        Self { items: Vec::new() }
    }

    #[inline]
    pub(crate) fn push(&mut self, x: X) {
        self.items.push(x);
    }

    /// Removes and returns the top value.
    #[inline]
    pub(crate) fn pop(&mut self) -> Result<X, StackUnderflow> {
        self.items.pop().ok_or(StackUnderflow)
    }

    /// Returns the top value without removing it, or `None` when empty.
    #[inline]
    pub(crate) fn peek(&self) -> Option<X> {
        self.items.last().copied()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Makes room for `additional` more pushes without reallocating.
    pub(crate) fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.items.try_reserve(additional).map_err(|_| {
            TryReserveError::array_of::<X>(self.items.len().saturating_add(additional))
        })
    }

    /// Drops every entry, keeping the backing allocation.
    #[inline]
    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    pub(crate) fn retain(&mut self, f: impl FnMut(&X) -> bool) {
        self.items.retain(f);
    }
}
