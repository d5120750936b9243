//! Raw fixed-capacity blocks.
//!
//! A block owns uninitialized storage for `capacity` values plus the
//! bookkeeping needed to hand slots out and take them back. It never reads
//! or drops values on its own: the physical allocator decides which slots
//! are live.

use allocator_api2::alloc::{Allocator, Global, Layout};
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::stack::{Stack, StackUnderflow};
use crate::TryReserveError;

/// Sentinel for "no index" in block chains and element links.
pub(crate) const NIL: usize = usize::MAX;

/// One chunk of contiguous storage.
pub(crate) struct Block<T> {
    /// Start of the storage, dangling for ZSTs
    ptr: NonNull<T>,
    /// Layout used for allocation, kept for deallocation
    layout: Layout,
    /// Number of slots this block can hold
    capacity: usize,
    /// Number of live values
    pub(crate) size: usize,
    /// First slot never handed out
    pub(crate) head: usize,
    /// Slots handed out and released since
    pub(crate) free_positions: Stack<usize>,
    /// Previous block in allocation order
    pub(crate) prev: usize,
    /// Next block in allocation order
    pub(crate) next: usize,
    _marker: PhantomData<T>,
}

impl<T> Block<T> {
    const IS_ZST: bool = std::mem::size_of::<T>() == 0;

    /// Allocates storage for `capacity` values without initializing any.
    pub(crate) fn try_new(capacity: usize) -> Result<Self, TryReserveError> {
        debug_assert!(capacity > 0);

        let layout =
            Layout::array::<T>(capacity).map_err(|_| TryReserveError::capacity_overflow())?;

        let ptr = if Self::IS_ZST {
            NonNull::dangling()
        } else {
            Global
                .allocate(layout)
                .map_err(|_| TryReserveError::alloc_error(layout))?
                .cast::<T>()
        };

        Ok(Self {
            ptr,
            layout,
            capacity,
            size: 0,
            head: 0,
            free_positions: Stack::new(),
            prev: NIL,
            next: NIL,
            _marker: PhantomData,
        })
    }

    #[cfg(test)]
    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) const fn is_full(&self) -> bool {
        self.size == self.capacity
    }

    #[inline]
    pub(crate) const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Picks the slot for the next value: a released position if one
    /// exists, otherwise the first never-used slot.
    ///
    /// Does not touch `size`; the caller commits the slot once the value
    /// is written.
    #[inline]
    pub(crate) fn take_position(&mut self) -> usize {
        debug_assert!(!self.is_full());
        match self.free_positions.pop() {
            Ok(pos) => pos,
            Err(StackUnderflow) => {
                let pos = self.head;
                self.head += 1;
                pos
            }
        }
    }

    /// Returns a raw pointer to the slot at `pos`.
    ///
    /// # Safety
    ///
    /// `pos` must be less than `capacity`.
    #[inline]
    pub(crate) unsafe fn slot_ptr(&self, pos: usize) -> *mut T {
        debug_assert!(pos < self.capacity);
        self.ptr.as_ptr().add(pos)
    }

    /// Moves `value` into the slot at `pos` and counts it as live.
    ///
    /// # Safety
    ///
    /// `pos` must come from `take_position` and not be live.
    #[inline]
    pub(crate) unsafe fn write(&mut self, pos: usize, value: T) {
        self.slot_ptr(pos).write(value);
        self.size += 1;
    }

    /// Moves the value out of `pos` and returns the slot to the free pool.
    ///
    /// # Safety
    ///
    /// `pos` must hold a live value.
    #[inline]
    pub(crate) unsafe fn read(&mut self, pos: usize) -> T {
        debug_assert!(self.size > 0);
        let value = self.slot_ptr(pos).read();
        self.free_positions.push(pos);
        self.size -= 1;
        value
    }
}

impl<T> Drop for Block<T> {
    fn drop(&mut self) {
        // Only frees memory. Live values must already be gone.
        if !Self::IS_ZST {
            unsafe {
                Global.deallocate(self.ptr.cast(), self.layout);
            }
        }
    }
}

// Safety: Block owns its allocation and T determines thread safety
unsafe impl<T: Send> Send for Block<T> {}
unsafe impl<T: Sync> Sync for Block<T> {}
