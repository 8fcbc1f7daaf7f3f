//! Book Registry - symbol routing, cancel, and reset.
//!
//! Owns one [`SymbolBook`] per symbol, the resting order store with its
//! cancel index, and the per-user counters that number cancel
//! acknowledgements. Exactly one thread drives a registry, so nothing in
//! here locks.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::command::{LogLine, Order, OrderKind, Side, TopOfBook};
use crate::config::{CancelAccounting, EngineConfig};
use crate::order_book::{BookId, OrderId, OrderStore, RestingOrder, SymbolBook};

/// All books of the engine plus the cross-book indices.
pub struct BookRegistry {
    books: Vec<SymbolBook>,
    symbols: FxHashMap<String, BookId>,
    store: OrderStore,
    /// userId -> last order ID seen or minted for that user
    last_ids: FxHashMap<u32, u32>,
    cancel_accounting: CancelAccounting,
}

impl BookRegistry {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            books: Vec::new(),
            symbols: FxHashMap::default(),
            store: OrderStore::with_capacity(config.order_capacity),
            last_ids: FxHashMap::default(),
            cancel_accounting: config.cancel_accounting,
        }
    }

    /// Process one order.
    ///
    /// # Returns
    /// `Some(lines)` for buy, sell and cancel (in emission order), `None`
    /// when the order was a flush and every book has been reset.
    pub fn handle_order(&mut self, order: &Order) -> Option<Vec<LogLine>> {
        match order.kind {
            OrderKind::Buy | OrderKind::Sell => {
                self.last_ids.insert(order.user_id, order.user_order_id);
                let book_id = self.book_id(&order.symbol);
                let book = &mut self.books[book_id as usize];
                let lines = if order.kind == OrderKind::Buy {
                    book.buy_order(book_id, order, &mut self.store)
                } else {
                    book.sell_order(book_id, order, &mut self.store)
                };
                Some(lines)
            }
            OrderKind::Cancel => Some(self.cancel(order)),
            OrderKind::Flush => {
                self.reset();
                None
            }
        }
    }

    /// Drop every book, every resting order and every user counter.
    pub fn reset(&mut self) {
        debug!(
            books = self.books.len(),
            resting = self.store.len(),
            "resetting order books"
        );
        self.books.clear();
        self.symbols.clear();
        self.store.clear();
        self.last_ids.clear();
    }

    /// Book for `symbol`, created on first use.
    fn book_id(&mut self, symbol: &str) -> BookId {
        if let Some(id) = self.symbols.get(symbol) {
            return *id;
        }
        let id = self.books.len() as BookId;
        self.books.push(SymbolBook::new());
        self.symbols.insert(symbol.to_owned(), id);
        trace!(symbol, id, "new symbol book");
        id
    }

    /// Acknowledge a cancel under a freshly minted ID and remove the order
    /// if it is still resting. The lookup is by order ID only; the
    /// cancelling user need not own the order.
    fn cancel(&mut self, order: &Order) -> Vec<LogLine> {
        let counter = self.last_ids.entry(order.user_id).or_insert(0);
        *counter = counter.wrapping_add(1);
        let new_id = *counter;

        let lines = vec![
            LogLine::CancelAck {
                user_id: order.user_id,
                user_order_id: order.user_order_id,
                new_id,
            },
            LogLine::Ack {
                user_id: order.user_id,
                user_order_id: new_id,
            },
        ];

        let id = order.user_order_id;
        match self.store.take(id) {
            Some(location) => {
                let release = self.cancel_accounting == CancelAccounting::Release;
                let book = &mut self.books[location.book as usize];
                let cancelled = book.cancel_resting(&location, &mut self.store.arena, release);
                trace!(id, owner = cancelled.user_id, qty = cancelled.quantity, "order cancelled");
            }
            None => trace!(id, "cancel of unknown order"),
        }

        lines
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn book(&self, symbol: &str) -> Option<&SymbolBook> {
        self.symbols.get(symbol).map(|id| &self.books[*id as usize])
    }

    pub fn best_bid(&self, symbol: &str) -> Option<u64> {
        self.book(symbol)?.best_bid()
    }

    pub fn best_ask(&self, symbol: &str) -> Option<u64> {
        self.book(symbol)?.best_ask()
    }

    pub fn top_of_book(&self, symbol: &str, side: Side) -> TopOfBook {
        self.book(symbol)?.top_of_book(side)
    }

    /// (total quantity, linked order count) at a price
    pub fn depth_at(&self, symbol: &str, side: Side, price: u64) -> (u64, u32) {
        self.book(symbol)
            .map(|book| book.depth_at(side, price))
            .unwrap_or((0, 0))
    }

    /// Resting orders at a price, oldest first
    pub fn resting_at(&self, symbol: &str, side: Side, price: u64) -> Vec<RestingOrder> {
        self.book(symbol)
            .map(|book| book.resting_at(side, price, &self.store.arena))
            .unwrap_or_default()
    }

    /// The resting order a cancel of `user_order_id` would remove
    pub fn resting_order(&self, user_order_id: OrderId) -> Option<RestingOrder> {
        let location = self.store.get(user_order_id)?;
        Some(RestingOrder::from(self.store.arena.get(location.node)))
    }

    /// Number of orders the cancel index knows about
    pub fn order_count(&self) -> usize {
        self.store.len()
    }

    /// Number of order nodes linked into any level
    pub fn resting_count(&self) -> u32 {
        self.store.arena.allocated()
    }

    pub fn symbol_count(&self) -> usize {
        self.books.len()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    /// Last order ID recorded or minted for a user
    pub fn last_order_id(&self, user_id: u32) -> Option<u32> {
        self.last_ids.get(&user_id).copied()
    }

    /// Pre-fault order memory
    pub fn warm_up(&mut self) {
        self.store.arena.warm_up();
    }

    /// Hash of the observable book state, independent of symbol creation
    /// order and hash map iteration order (for determinism testing).
    pub fn state_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        let mut symbols: Vec<_> = self.symbols.iter().collect();
        symbols.sort();

        for (symbol, id) in symbols {
            let book = &self.books[*id as usize];
            symbol.hash(&mut hasher);
            for side in [Side::Buy, Side::Sell] {
                book.top_of_book(side).hash(&mut hasher);
                for level in book.levels(side) {
                    level.price.hash(&mut hasher);
                    level.total_qty.hash(&mut hasher);
                    for idx in level.iter(&self.store.arena) {
                        let node = self.store.arena.get(idx);
                        (node.user_id, node.user_order_id, node.qty).hash(&mut hasher);
                    }
                }
            }
        }

        self.store.len().hash(&mut hasher);
        hasher.finish()
    }
}

impl Default for BookRegistry {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl std::fmt::Debug for BookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookRegistry")
            .field("symbols", &self.books.len())
            .field("orders", &self.store.len())
            .field("users", &self.last_ids.len())
            .finish()
    }
}
