//! Price Level - A FIFO queue of orders at a single price point.
//!
//! Implements a doubly-linked list using arena indices for O(1)
//! insertion and removal from any position, and walks in either direction.

use crate::arena::{Arena, ArenaIndex, NULL_INDEX};

/// A queue of resting orders at a specific price.
///
/// `total_qty` is the level's aggregate open quantity as reported in book
/// updates. It tracks the sum of its orders' quantities except after a
/// [`detach`](PriceLevel::detach), which unlinks an order without releasing
/// its quantity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price shared by every order in the queue
    pub price: u64,
    /// Index of the oldest order
    pub head: ArenaIndex,
    /// Index of the newest order
    pub tail: ArenaIndex,
    /// Aggregate open quantity at this level
    pub total_qty: u64,
    /// Number of linked orders
    pub count: u32,
}

impl PriceLevel {
    /// Create a new empty price level
    #[inline]
    pub const fn new(price: u64) -> Self {
        Self {
            price,
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_qty: 0,
            count: 0,
        }
    }

    /// Returns true if no orders are linked at this level
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true if the level counts toward top-of-book
    #[inline]
    pub const fn is_live(&self) -> bool {
        self.total_qty > 0
    }

    /// Append an order to the tail of the queue and add its quantity.
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn push_back(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let qty = arena.get(index).qty;

        if self.tail == NULL_INDEX {
            debug_assert!(self.head == NULL_INDEX);
            self.head = index;
            self.tail = index;
            arena.get_mut(index).prev = NULL_INDEX;
            arena.get_mut(index).next = NULL_INDEX;
        } else {
            arena.get_mut(self.tail).next = index;
            arena.get_mut(index).prev = self.tail;
            arena.get_mut(index).next = NULL_INDEX;
            self.tail = index;
        }

        self.count += 1;
        self.total_qty += qty as u64;
    }

    /// Unlink an order from anywhere in the queue, leaving `total_qty` as is.
    ///
    /// Handles all edge cases:
    /// - Only node in level (head == tail)
    /// - Removing head
    /// - Removing tail
    /// - Removing from middle
    ///
    /// The order is NOT freed from the arena; caller must do that.
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn detach(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let node = arena.get(index);
        let prev_idx = node.prev;
        let next_idx = node.next;

        if prev_idx == NULL_INDEX && next_idx == NULL_INDEX {
            debug_assert!(self.head == index && self.tail == index);
            self.head = NULL_INDEX;
            self.tail = NULL_INDEX;
        } else if prev_idx == NULL_INDEX {
            debug_assert!(self.head == index);
            self.head = next_idx;
            arena.get_mut(next_idx).prev = NULL_INDEX;
        } else if next_idx == NULL_INDEX {
            debug_assert!(self.tail == index);
            self.tail = prev_idx;
            arena.get_mut(prev_idx).next = NULL_INDEX;
        } else {
            arena.get_mut(prev_idx).next = next_idx;
            arena.get_mut(next_idx).prev = prev_idx;
        }

        self.count -= 1;

        arena.get_mut(index).prev = NULL_INDEX;
        arena.get_mut(index).next = NULL_INDEX;
    }

    /// Unlink an order and release its remaining quantity from the level.
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn remove(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let qty = arena.get(index).qty;
        self.detach(arena, index);
        self.subtract_qty(qty);
    }

    /// Update total quantity after a fill.
    #[inline]
    pub fn subtract_qty(&mut self, qty: u32) {
        debug_assert!(self.total_qty >= qty as u64);
        self.total_qty = self.total_qty.saturating_sub(qty as u64);
    }

    /// Arena indices from oldest to newest.
    pub fn iter<'a>(&self, arena: &'a Arena) -> impl Iterator<Item = ArenaIndex> + 'a {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            if cursor == NULL_INDEX {
                return None;
            }
            let current = cursor;
            cursor = arena.get(current).next;
            Some(current)
        })
    }

    /// Sum of the linked orders' quantities (O(n), for checks and snapshots).
    pub fn linked_qty(&self, arena: &Arena) -> u64 {
        self.iter(arena).map(|idx| arena.get(idx).qty as u64).sum()
    }
}
