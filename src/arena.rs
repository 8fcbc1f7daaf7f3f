//! Arena Allocator - O(1) slab allocator with cache-line aligned nodes.
//!
//! Resting orders live in one contiguous block of nodes addressed by 32-bit
//! indices. Price level FIFOs are threaded through the nodes' `next`/`prev`
//! fields, so an index stays a valid handle for as long as the order rests,
//! no matter how many other orders come and go. Freed nodes go onto a free
//! list and are reused before the block grows.

use std::fmt;

/// Sentinel value representing a null/invalid index (like nullptr)
pub const NULL_INDEX: u32 = u32::MAX;

/// Type alias for arena indices - our "compressed pointers"
pub type ArenaIndex = u32;

/// A single resting order - exactly 64 bytes (one cache line).
///
/// # Memory Layout
///
/// | Field         | Type    | Offset | Size |
/// |---------------|---------|--------|------|
/// | price         | u64     | 0      | 8    |
/// | qty           | u32     | 8      | 4    |
/// | user_id       | u32     | 12     | 4    |
/// | user_order_id | u32     | 16     | 4    |
/// | next          | u32     | 20     | 4    |
/// | prev          | u32     | 24     | 4    |
/// | _reserved     | [u8;36] | 28     | 36   |
/// | **Total**     |         |        | 64   |
#[repr(C)]
#[repr(align(64))]
#[derive(Clone, Copy)]
pub struct OrderNode {
    /// Limit price of the resting order
    pub price: u64,

    /// Unfilled quantity, decremented in place on partial fills
    pub qty: u32,

    /// Owner, checked for self-trade prevention
    pub user_id: u32,

    /// Client-assigned order ID
    pub user_order_id: u32,

    /// Index of the next (newer) order at the same price level
    pub next: ArenaIndex,

    /// Index of the previous (older) order at the same price level
    pub prev: ArenaIndex,

    pub _reserved: [u8; 36],
}

const _: () = assert!(
    std::mem::size_of::<OrderNode>() == 64,
    "OrderNode must be exactly 64 bytes (one cache line)"
);

const _: () = assert!(
    std::mem::align_of::<OrderNode>() == 64,
    "OrderNode must be 64-byte aligned"
);

impl OrderNode {
    /// Create a new unlinked order node
    #[inline]
    pub fn new(user_id: u32, user_order_id: u32, price: u64, qty: u32) -> Self {
        Self {
            price,
            qty,
            user_id,
            user_order_id,
            next: NULL_INDEX,
            prev: NULL_INDEX,
            _reserved: [0u8; 36],
        }
    }

    /// Create an empty node (for the free list)
    #[inline]
    pub const fn empty() -> Self {
        Self {
            price: 0,
            qty: 0,
            user_id: 0,
            user_order_id: 0,
            next: NULL_INDEX,
            prev: NULL_INDEX,
            _reserved: [0u8; 36],
        }
    }
}

impl fmt::Debug for OrderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderNode")
            .field("user_id", &self.user_id)
            .field("user_order_id", &self.user_order_id)
            .field("price", &self.price)
            .field("qty", &self.qty)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

/// Pool of order nodes with O(1) allocation and deallocation.
///
/// Uses a free list threaded through the `next` field of unused nodes.
/// When the free list runs dry the pool grows by one node; existing
/// indices are unaffected.
pub struct Arena {
    /// Contiguous block of nodes
    nodes: Vec<OrderNode>,

    /// Head of the free list (index of first available node)
    free_head: ArenaIndex,

    /// Number of currently allocated nodes
    allocated_count: u32,
}

impl Arena {
    /// Create an arena with `capacity` pre-allocated nodes.
    ///
    /// # Panics
    /// Panics if capacity is not below `NULL_INDEX`.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < NULL_INDEX, "Capacity must be less than NULL_INDEX");

        let mut arena = Self {
            nodes: vec![OrderNode::empty(); capacity as usize],
            free_head: NULL_INDEX,
            allocated_count: 0,
        };
        arena.rebuild_free_list();
        arena
    }

    /// Thread the free list through every node, lowest index first.
    fn rebuild_free_list(&mut self) {
        let len = self.nodes.len() as u32;
        for i in 0..len {
            self.nodes[i as usize] = OrderNode::empty();
            self.nodes[i as usize].next = if i + 1 < len { i + 1 } else { NULL_INDEX };
        }
        self.free_head = if len > 0 { 0 } else { NULL_INDEX };
        self.allocated_count = 0;
    }

    /// Allocate a node and initialise it with `node`.
    ///
    /// # Panics
    /// Panics if the arena would need more than `NULL_INDEX` nodes.
    ///
    /// # Complexity
    /// O(1) amortized
    #[inline]
    pub fn alloc(&mut self, node: OrderNode) -> ArenaIndex {
        let index = if self.free_head == NULL_INDEX {
            let index = self.nodes.len() as u32;
            assert!(index < NULL_INDEX, "order arena exhausted");
            self.nodes.push(OrderNode::empty());
            index
        } else {
            let index = self.free_head;
            self.free_head = self.nodes[index as usize].next;
            index
        };

        self.nodes[index as usize] = node;
        self.nodes[index as usize].next = NULL_INDEX;
        self.nodes[index as usize].prev = NULL_INDEX;
        self.allocated_count += 1;
        index
    }

    /// Return a node to the free list.
    ///
    /// The caller must ensure the index is allocated and already unlinked
    /// from its price level.
    #[inline]
    pub fn free(&mut self, index: ArenaIndex) {
        debug_assert!((index as usize) < self.nodes.len(), "Index out of bounds");
        debug_assert!(self.allocated_count > 0, "Double free detected");

        self.nodes[index as usize] = OrderNode::empty();
        self.nodes[index as usize].next = self.free_head;
        self.free_head = index;
        self.allocated_count -= 1;
    }

    #[inline]
    pub fn get(&self, index: ArenaIndex) -> &OrderNode {
        &self.nodes[index as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, index: ArenaIndex) -> &mut OrderNode {
        &mut self.nodes[index as usize]
    }

    /// Returns the number of currently allocated nodes.
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated_count
    }

    /// Returns the number of nodes backing the arena (allocated or free).
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.nodes.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated_count == 0
    }

    /// Free every node at once. Backing memory is kept for reuse.
    pub fn clear(&mut self) {
        self.rebuild_free_list();
    }

    /// Pre-fault all memory pages (warm-up routine).
    ///
    /// Walks through all nodes to force the OS to map virtual pages
    /// to physical RAM, preventing page faults in the hot path.
    pub fn warm_up(&mut self) {
        for node in &mut self.nodes {
            unsafe {
                std::ptr::write_volatile(&mut node._reserved[0], 0);
            }
        }
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.nodes.len())
            .field("allocated", &self.allocated_count)
            .field("free_head", &self.free_head)
            .finish()
    }
}
