//! Order Book - one symbol's two-sided price ladder.
//!
//! Price levels live in a per-book level arena addressed by [`LevelId`].
//! Each side keeps an ordered map from price to level for top-of-book scans,
//! and a hash side-table gives O(1) access to any price touched before.
//! Levels are never removed once created: an emptied level stays in place
//! with zero quantity so the next order at that price reuses it.
//!
//! Resting orders themselves sit in the registry-wide [`OrderStore`], which
//! also owns the order-ID index used for O(1) cancels.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use rustc_hash::FxHashMap;

use crate::arena::{Arena, ArenaIndex, OrderNode};
use crate::command::{Side, TopOfBook};
use crate::price_level::PriceLevel;

/// Index of a price level inside its book
pub type LevelId = u32;

/// Index of a symbol book inside the registry
pub type BookId = u32;

/// Client-assigned order ID. The cancel index is keyed by it alone,
/// whichever user sent the order.
pub type OrderId = u32;

/// Where a resting order lives: everything a cancel needs, by handle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderLocation {
    /// Book holding the order
    pub book: BookId,
    /// Side of that book
    pub side: Side,
    /// Level inside the book
    pub level: LevelId,
    /// Position inside the level's FIFO
    pub node: ArenaIndex,
}

/// Resting order storage shared by every book of a registry.
#[derive(Debug, Default)]
pub struct OrderStore {
    /// Order nodes; FIFO links of all price levels run through here
    pub arena: Arena,
    /// userOrderId -> location, for O(1) cancel
    index: FxHashMap<OrderId, OrderLocation>,
}

impl OrderStore {
    pub fn with_capacity(orders: u32) -> Self {
        Self {
            arena: Arena::new(orders),
            index: FxHashMap::with_capacity_and_hasher(orders as usize, Default::default()),
        }
    }

    /// Record where an order rests. A live entry under the same ID is
    /// replaced; the order it pointed at stays in its FIFO, unindexed.
    #[inline]
    pub fn register(&mut self, id: OrderId, location: OrderLocation) {
        self.index.insert(id, location);
    }

    /// Drop the index entry for a filled order's ID, wherever it points.
    #[inline]
    pub fn forget(&mut self, id: OrderId) {
        self.index.remove(&id);
    }

    /// Remove and return the index entry for `id`.
    #[inline]
    pub fn take(&mut self, id: OrderId) -> Option<OrderLocation> {
        self.index.remove(&id)
    }

    #[inline]
    pub fn get(&self, id: OrderId) -> Option<&OrderLocation> {
        self.index.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: OrderId) -> bool {
        self.index.contains_key(&id)
    }

    /// Number of indexed (cancellable) orders
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.index.clear();
    }
}

/// A resting order as seen from outside the book
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestingOrder {
    pub user_id: u32,
    pub user_order_id: u32,
    pub price: u64,
    pub quantity: u32,
}

impl From<&OrderNode> for RestingOrder {
    fn from(node: &OrderNode) -> Self {
        Self {
            user_id: node.user_id,
            user_order_id: node.user_order_id,
            price: node.price,
            quantity: node.qty,
        }
    }
}

/// One instrument's price ladder.
pub struct SymbolBook {
    /// Level arena; `LevelId`s index into it
    levels: Vec<PriceLevel>,
    /// Buy levels, best = highest price
    bids: BTreeMap<u64, LevelId>,
    /// Sell levels, best = lowest price
    asks: BTreeMap<u64, LevelId>,
    /// (side, price) -> level, O(1) re-access after first creation
    price_index: FxHashMap<(Side, u64), LevelId>,
    /// Cached best bid price (highest live buy level)
    best_bid: Option<u64>,
    /// Cached best ask price (lowest live sell level)
    best_ask: Option<u64>,
}

impl SymbolBook {
    pub fn new() -> Self {
        Self {
            levels: Vec::new(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            price_index: FxHashMap::default(),
            best_bid: None,
            best_ask: None,
        }
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    #[inline]
    pub fn best_bid(&self) -> Option<u64> {
        self.best_bid
    }

    #[inline]
    pub fn best_ask(&self) -> Option<u64> {
        self.best_ask
    }

    #[inline]
    pub fn best_price(&self, side: Side) -> Option<u64> {
        match side {
            Side::Buy => self.best_bid,
            Side::Sell => self.best_ask,
        }
    }

    /// Best price on `side` with its aggregate quantity
    pub fn top_of_book(&self, side: Side) -> TopOfBook {
        let price = self.best_price(side)?;
        let id = self.level_id(side, price)?;
        Some((price, self.level(id).total_qty))
    }

    /// Spread (best_ask - best_bid) when the book is not crossed
    pub fn spread(&self) -> Option<u64> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    /// Update best price cache after quantity was added at `price`.
    pub fn update_best_price_on_add(&mut self, side: Side, price: u64) {
        match side {
            Side::Buy => {
                if self.best_bid.map_or(true, |best| price > best) {
                    self.best_bid = Some(price);
                }
            }
            Side::Sell => {
                if self.best_ask.map_or(true, |best| price < best) {
                    self.best_ask = Some(price);
                }
            }
        }
    }

    /// Recompute the cached best price of `side` by scanning from the
    /// extreme end past zero-quantity levels.
    pub fn refresh_best(&mut self, side: Side) {
        let levels = &self.levels;
        match side {
            Side::Buy => {
                self.best_bid = self
                    .bids
                    .iter()
                    .rev()
                    .find(|(_, id)| levels[**id as usize].is_live())
                    .map(|(p, _)| *p);
            }
            Side::Sell => {
                self.best_ask = self
                    .asks
                    .iter()
                    .find(|(_, id)| levels[**id as usize].is_live())
                    .map(|(p, _)| *p);
            }
        }
    }

    // ========================================================================
    // Level Access
    // ========================================================================

    #[inline]
    pub fn level_id(&self, side: Side, price: u64) -> Option<LevelId> {
        self.price_index.get(&(side, price)).copied()
    }

    #[inline]
    pub fn level(&self, id: LevelId) -> &PriceLevel {
        &self.levels[id as usize]
    }

    #[inline]
    pub fn level_mut(&mut self, id: LevelId) -> &mut PriceLevel {
        &mut self.levels[id as usize]
    }

    /// Get or create the level for `price` on `side`.
    ///
    /// # Complexity
    /// O(1) for a price seen before, O(log n) the first time.
    pub fn level_for(&mut self, side: Side, price: u64) -> LevelId {
        if let Some(id) = self.price_index.get(&(side, price)) {
            return *id;
        }

        let id = self.levels.len() as LevelId;
        self.levels.push(PriceLevel::new(price));
        match side {
            Side::Buy => self.bids.insert(price, id),
            Side::Sell => self.asks.insert(price, id),
        };
        self.price_index.insert((side, price), id);
        id
    }

    /// The next live level strictly worse than `price` on `side`.
    pub fn next_live_level(&self, side: Side, price: u64) -> Option<(u64, LevelId)> {
        let levels = &self.levels;
        let found = match side {
            Side::Buy => self
                .bids
                .range(..price)
                .rev()
                .find(|(_, id)| levels[**id as usize].is_live()),
            Side::Sell => self
                .asks
                .range((Excluded(price), Unbounded))
                .find(|(_, id)| levels[**id as usize].is_live()),
        };
        found.map(|(p, id)| (*p, *id))
    }

    /// Levels of `side` from best to worst, including emptied ones.
    pub fn levels(&self, side: Side) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match side {
            Side::Buy => Box::new(self.bids.values().rev().map(|id| self.level(*id))),
            Side::Sell => Box::new(self.asks.values().map(|id| self.level(*id))),
        }
    }

    /// (total quantity, linked order count) at a price
    pub fn depth_at(&self, side: Side, price: u64) -> (u64, u32) {
        self.level_id(side, price)
            .map(|id| {
                let level = self.level(id);
                (level.total_qty, level.count)
            })
            .unwrap_or((0, 0))
    }

    /// Number of levels ever created on `side`
    pub fn level_count(&self, side: Side) -> usize {
        match side {
            Side::Buy => self.bids.len(),
            Side::Sell => self.asks.len(),
        }
    }

    /// Resting orders at a price, oldest first
    pub fn resting_at(&self, side: Side, price: u64, arena: &Arena) -> Vec<RestingOrder> {
        match self.level_id(side, price) {
            Some(id) => self
                .level(id)
                .iter(arena)
                .map(|idx| RestingOrder::from(arena.get(idx)))
                .collect(),
            None => Vec::new(),
        }
    }
}

impl Default for SymbolBook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SymbolBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolBook")
            .field("best_bid", &self.best_bid)
            .field("best_ask", &self.best_ask)
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .finish()
    }
}
