//! Logical (insertion) order of live values.
//!
//! Every live value has one [`Node`] in an index arena. Nodes are linked in
//! timestamp order, ending in a permanent sentinel that plays the role of
//! the past-the-end position. Physical placement never affects this order.

use crate::block::NIL;
use crate::stack::Stack;
use crate::TryReserveError;

/// Arena index of the past-the-end sentinel.
pub(crate) const OVER_END: usize = 0;

/// Timestamp of a vacant node. Live timestamps start at 1.
const VACANT: u64 = 0;

/// One element of the virtual order list.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Node {
    /// Block holding the value
    pub(crate) block: usize,
    /// Slot within the block
    pub(crate) position: usize,
    /// Insertion timestamp, ordering and identity key
    pub(crate) time: u64,
    pub(crate) prev: usize,
    pub(crate) next: usize,
}

impl Node {
    const fn sentinel(time: u64) -> Self {
        Self {
            block: NIL,
            position: NIL,
            time,
            prev: NIL,
            next: NIL,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct VirtualList {
    nodes: Vec<Node>,
    vacant: Stack<usize>,
    /// First live node, or `OVER_END` when empty
    start: usize,
    /// Last live node, or `OVER_END` when empty
    end: usize,
}

impl VirtualList {
    pub(crate) fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates an empty list whose first element gets timestamp `time`.
    pub(crate) fn starting_at(time: u64) -> Self {
        debug_assert!(time > VACANT);
        Self {
            nodes: vec![Node::sentinel(time)],
            vacant: Stack::new(),
            start: OVER_END,
            end: OVER_END,
        }
    }

    #[inline]
    pub(crate) fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub(crate) fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.start == OVER_END
    }

    /// Timestamp the next appended element will receive.
    #[inline]
    pub(crate) fn next_time(&self) -> u64 {
        self.nodes[OVER_END].time
    }

    #[inline]
    pub(crate) fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// Returns `true` if `index` holds the live element stamped `time`.
    #[inline]
    pub(crate) fn is_live(&self, index: usize, time: u64) -> bool {
        index != OVER_END
            && time != VACANT
            && self.nodes.get(index).is_some_and(|node| node.time == time)
    }

    /// Links a new element for `(block, position)` after the current end.
    pub(crate) fn append(&mut self, block: usize, position: usize) -> usize {
        let time = self.next_time();
        debug_assert!(time < u64::MAX, "timestamp space exhausted");

        let node = Node {
            block,
            position,
            time,
            prev: NIL,
            next: OVER_END,
        };
        let index = match self.vacant.pop() {
            Ok(index) => {
                self.nodes[index] = node;
                index
            }
            Err(_) => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        if self.start == OVER_END {
            self.start = index;
        } else {
            self.nodes[self.end].next = index;
            self.nodes[index].prev = self.end;
        }
        self.end = index;

        let sentinel = &mut self.nodes[OVER_END];
        sentinel.prev = index;
        sentinel.time = time + 1;
        index
    }

    /// Removes a live element from the chain and vacates its node.
    ///
    /// Returns the unlinked node so the caller can release its slot.
    pub(crate) fn unlink(&mut self, index: usize) -> Node {
        debug_assert!(index != OVER_END);
        let node = self.nodes[index];
        debug_assert!(node.time != VACANT);

        if node.prev != NIL {
            self.nodes[node.prev].next = node.next;
        } else {
            self.start = node.next;
        }
        // `next` is at worst the sentinel
        self.nodes[node.next].prev = node.prev;
        if node.next == OVER_END {
            self.end = if node.prev != NIL { node.prev } else { OVER_END };
        }

        self.nodes[index] = Node {
            time: VACANT,
            prev: NIL,
            next: NIL,
            ..node
        };
        self.vacant.push(index);
        node
    }

    /// Drops every node and returns to the empty state.
    ///
    /// The sentinel keeps its timestamp so earlier cursors stay stale.
    pub(crate) fn reset(&mut self) {
        let time = self.next_time();
        self.nodes.truncate(1);
        self.nodes[OVER_END] = Node::sentinel(time);
        self.vacant.clear();
        self.start = OVER_END;
        self.end = OVER_END;
    }

    /// Reserves room for `additional` more elements so the next
    /// `additional` appends cannot allocate.
    pub(crate) fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let fresh = additional.saturating_sub(self.vacant.len());
        self.nodes.try_reserve(fresh).map_err(|_| {
            TryReserveError::array_of::<Node>(self.nodes.len().saturating_add(fresh))
        })
    }
}
