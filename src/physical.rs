//! Physical placement of values.
//!
//! `PhysicalMemory` owns every block, threads them into a chain in
//! allocation order, and keeps a stack of blocks that still accept values.
//! The top of that stack is where the next insert lands. Blocks are freed
//! the moment their last value leaves, so peak memory tracks the number of
//! live values rounded up to the bucket capacity.

use crate::block::{Block, NIL};
use crate::stack::Stack;
use crate::{TryInsertError, TryReserveError};

/// Generation-checked reference to a block arena slot.
///
/// Entries on the free-block stack may outlive the block they name; the
/// generation tells a live block apart from a later one reusing the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockId {
    index: usize,
    generation: u32,
}

struct BlockEntry<T> {
    generation: u32,
    block: Option<Block<T>>,
}

pub(crate) struct PhysicalMemory<T> {
    /// Block arena, indexed by `BlockId::index`
    entries: Vec<BlockEntry<T>>,
    /// Arena slots whose block was freed
    vacant: Stack<usize>,
    /// Blocks with at least one free slot; top is the allocation target
    free_blocks: Stack<BlockId>,
    /// Oldest live block
    first: usize,
    /// Newest live block
    last: usize,
    /// Number of live blocks
    block_count: usize,
    /// Slots per block
    bucket_capacity: usize,
}

impl<T> PhysicalMemory<T> {
    pub(crate) const fn new(bucket_capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            vacant: Stack::new(),
            free_blocks: Stack::new(),
            first: NIL,
            last: NIL,
            block_count: 0,
            bucket_capacity,
        }
    }

    #[inline]
    pub(crate) const fn bucket_capacity(&self) -> usize {
        self.bucket_capacity
    }

    #[inline]
    pub(crate) const fn block_count(&self) -> usize {
        self.block_count
    }

    /// Total slots across live blocks, used or not.
    #[inline]
    pub(crate) const fn capacity(&self) -> usize {
        self.bucket_capacity * self.block_count
    }

    #[inline]
    fn block(&self, index: usize) -> &Block<T> {
        match self.entries[index].block.as_ref() {
            Some(block) => block,
            None => unreachable!("block {index} is not allocated"),
        }
    }

    #[inline]
    fn block_mut(&mut self, index: usize) -> &mut Block<T> {
        match self.entries[index].block.as_mut() {
            Some(block) => block,
            None => unreachable!("block {index} is not allocated"),
        }
    }

    #[inline]
    fn id_of(&self, index: usize) -> BlockId {
        BlockId {
            index,
            generation: self.entries[index].generation,
        }
    }

    #[inline]
    fn is_live(&self, id: BlockId) -> bool {
        self.entries
            .get(id.index)
            .is_some_and(|entry| entry.generation == id.generation && entry.block.is_some())
    }

    /// Returns the block new values should go to, discarding stack entries
    /// for blocks that have since been freed.
    fn current_target(&mut self) -> Option<usize> {
        while let Some(id) = self.free_blocks.peek() {
            if self.is_live(id) && !self.block(id.index).is_full() {
                return Some(id.index);
            }
            let _ = self.free_blocks.pop();
        }
        None
    }

    fn try_reserve_bookkeeping(&mut self) -> Result<(), TryReserveError> {
        if self.vacant.peek().is_none() {
            self.entries.try_reserve(1).map_err(|_| {
                TryReserveError::array_of::<BlockEntry<T>>(self.entries.len().saturating_add(1))
            })?;
        }
        self.free_blocks.try_reserve(1)
    }

    /// Allocates a block, appends it to the chain and makes it the
    /// allocation target.
    fn try_grow(&mut self) -> Result<usize, TryReserveError> {
        // Room for the bookkeeping first, so no push below can allocate.
        let mut block = self
            .try_reserve_bookkeeping()
            .and_then(|()| Block::try_new(self.bucket_capacity))
            .inspect_err(|err| {
                tracing::debug!(
                    bucket_capacity = self.bucket_capacity,
                    error = %err,
                    "block allocation failed"
                );
            })?;
        block.prev = self.last;

        let index = match self.vacant.pop() {
            Ok(index) => {
                self.entries[index].block = Some(block);
                index
            }
            Err(_) => {
                self.entries.push(BlockEntry {
                    generation: 0,
                    block: Some(block),
                });
                self.entries.len() - 1
            }
        };

        if self.last != NIL {
            self.block_mut(self.last).next = index;
        } else {
            self.first = index;
        }
        self.last = index;
        self.block_count += 1;
        self.free_blocks.push(self.id_of(index));

        tracing::trace!(block = index, blocks = self.block_count, "allocated block");
        Ok(index)
    }

    /// Places `value` in the current target block, allocating one if needed.
    ///
    /// On allocation failure the value is handed back and nothing changes.
    pub(crate) fn try_acquire_slot(
        &mut self,
        value: T,
    ) -> Result<(usize, usize), TryInsertError<T>> {
        let index = match self.current_target() {
            Some(index) => index,
            None => match self.try_grow() {
                Ok(index) => index,
                Err(err) => return Err(TryInsertError::new(value, err)),
            },
        };

        let block = self.block_mut(index);
        let position = block.take_position();
        // Safety: position was just taken from this block's free pool
        unsafe { block.write(position, value) };

        if block.is_full() {
            // A full block is no longer a target; it is the top of the stack.
            let popped = self.free_blocks.pop();
            debug_assert_eq!(popped.map(|id| id.index), Ok(index));
        }

        Ok((index, position))
    }

    /// Moves the value out of `(index, position)` and recycles the slot.
    ///
    /// A block that was full goes back on the free-block stack; a block
    /// that becomes empty is freed.
    ///
    /// # Safety
    ///
    /// `(index, position)` must hold a live value.
    pub(crate) unsafe fn release_slot(&mut self, index: usize, position: usize) -> T {
        let block = self.block_mut(index);
        let was_full = block.is_full();
        let value = block.read(position);

        if block.is_empty() {
            self.free_block(index);
        } else if was_full {
            self.free_blocks.push(self.id_of(index));
        }

        value
    }

    /// Unlinks an empty block from the chain and releases its storage.
    fn free_block(&mut self, index: usize) {
        let id = self.id_of(index);
        let (prev, next) = {
            let block = self.block(index);
            debug_assert!(block.is_empty());
            (block.prev, block.next)
        };

        if prev != NIL {
            self.block_mut(prev).next = next;
        } else {
            self.first = next;
        }
        if next != NIL {
            self.block_mut(next).prev = prev;
        } else {
            self.last = prev;
        }

        let entry = &mut self.entries[index];
        entry.block = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.vacant.push(index);
        self.block_count -= 1;

        // Entries buried deeper are dropped when they surface.
        if self.free_blocks.peek() == Some(id) {
            let _ = self.free_blocks.pop();
        }

        tracing::trace!(block = index, blocks = self.block_count, "freed block");
    }

    /// Allocates `count` blocks up front so the next `count * bucket_capacity`
    /// inserts never allocate. Blocks fill in chain order.
    ///
    /// On failure the blocks allocated so far stay owned by `self`.
    pub(crate) fn try_reserve_blocks(&mut self, count: usize) -> Result<(), TryReserveError> {
        for _ in 0..count {
            self.try_grow()?;
        }

        // Rebuild the stack so the oldest block with room is on top.
        self.free_blocks.clear();
        self.free_blocks.try_reserve(self.block_count)?;
        let mut index = self.last;
        while index != NIL {
            let block = self.block(index);
            let prev = block.prev;
            if !block.is_full() {
                self.free_blocks.push(self.id_of(index));
            }
            index = prev;
        }
        Ok(())
    }

    /// Forgets which blocks have spare capacity.
    pub(crate) fn clear_free_blocks(&mut self) {
        self.free_blocks.clear();
    }

    /// Drops entries for freed blocks still sitting on the free-block stack.
    pub(crate) fn compact_free_blocks(&mut self) {
        let entries = &self.entries;
        self.free_blocks.retain(|id| {
            entries.get(id.index).is_some_and(|entry| {
                entry.generation == id.generation && entry.block.is_some()
            })
        });
    }

    /// # Safety
    ///
    /// `(index, position)` must hold a live value.
    #[inline]
    pub(crate) unsafe fn get(&self, index: usize, position: usize) -> &T {
        &*self.block(index).slot_ptr(position)
    }

    /// # Safety
    ///
    /// `(index, position)` must hold a live value.
    #[inline]
    pub(crate) unsafe fn get_mut(&mut self, index: usize, position: usize) -> &mut T {
        &mut *self.block(index).slot_ptr(position)
    }

    /// Raw pointer to a slot, for iterators that hand out `&mut T`.
    ///
    /// # Safety
    ///
    /// `index` must name a live block and `position < bucket_capacity`.
    #[inline]
    pub(crate) unsafe fn slot_ptr(&self, index: usize, position: usize) -> *mut T {
        self.block(index).slot_ptr(position)
    }

    /// Block indices in allocation order.
    #[cfg(test)]
    pub(crate) fn chain(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut index = self.first;
        while index != NIL {
            out.push(index);
            index = self.block(index).next;
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn free_block_count(&self) -> usize {
        self.free_blocks.len()
    }
}
