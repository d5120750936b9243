//! Error types returned by `BucketStorage` operations.

use allocator_api2::alloc::Layout;
use std::fmt::Debug;

/// Misuse of a [`Cursor`](crate::Cursor) detected by the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The element the cursor referred to has been erased.
    #[error("cursor refers to an erased element")]
    StaleCursor,
    /// The cursor was produced by a different storage.
    #[error("cursor belongs to a different storage")]
    ForeignCursor,
    /// The operation needs an element but the cursor is past the end.
    #[error("cursor is past the end")]
    EndCursor,
    /// Stepping by `distance` would leave the range `begin..=end`.
    #[error("cannot move cursor by {distance}: out of range")]
    OutOfRange {
        /// The requested step count.
        distance: isize,
    },
}

/// The error type for fallible block allocation.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
#[error("{kind}")]
pub struct TryReserveError {
    kind: TryReserveErrorKind,
}

#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
enum TryReserveErrorKind {
    /// The block size computation overflowed.
    #[error("memory allocation failed due to capacity overflow")]
    CapacityOverflow,
    /// Memory allocation failed.
    #[error("memory allocation of {} bytes failed", .layout.size())]
    AllocError { layout: Layout },
}

impl TryReserveError {
    pub(crate) fn capacity_overflow() -> Self {
        Self {
            kind: TryReserveErrorKind::CapacityOverflow,
        }
    }

    pub(crate) fn alloc_error(layout: Layout) -> Self {
        Self {
            kind: TryReserveErrorKind::AllocError { layout },
        }
    }

    /// Failure to grow a bookkeeping array to `len` items of `X`.
    pub(crate) fn array_of<X>(len: usize) -> Self {
        match Layout::array::<X>(len) {
            Ok(layout) => Self::alloc_error(layout),
            Err(_) => Self::capacity_overflow(),
        }
    }

    /// Returns the layout whose allocation failed, if any.
    pub fn layout(&self) -> Option<Layout> {
        match self.kind {
            TryReserveErrorKind::CapacityOverflow => None,
            TryReserveErrorKind::AllocError { layout } => Some(layout),
        }
    }
}

/// Error returned by [`BucketStorage::try_insert`](crate::BucketStorage::try_insert)
/// when a new block could not be allocated.
///
/// Carries the value back so the caller can retry or dispose of it.
#[derive(Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not insert into bucket storage: {source}")]
pub struct TryInsertError<T> {
    value: T,
    source: TryReserveError,
}

impl<T> TryInsertError<T> {
    pub(crate) fn new(value: T, source: TryReserveError) -> Self {
        Self { value, source }
    }

    /// Returns the value that could not be inserted.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Returns the underlying allocation error.
    pub fn reserve_error(&self) -> &TryReserveError {
        &self.source
    }
}

impl<T> Debug for TryInsertError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TryInsertError")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
