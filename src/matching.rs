//! Matching - the cross/rest algorithm for one symbol.
//!
//! 1. CROSSING: walk the opposite side from its top of book, trading at each
//!    resting order's price while the incoming limit allows it
//! 2. RESTING: park any remainder of a limit order in its own side's ladder
//!
//! A buy consumes each sell level oldest-first. A sell consumes each buy
//! level newest-first. Downstream consumers depend on this trade ordering.

use tracing::trace;

use crate::arena::{Arena, OrderNode, NULL_INDEX};
use crate::command::{LogLine, Order, Side};
use crate::order_book::{BookId, LevelId, OrderLocation, OrderStore, RestingOrder, SymbolBook};

/// Whether a limit price reaches the best opposite price.
#[inline]
fn crosses(taker_side: Side, limit: u64, opposite: u64) -> bool {
    match taker_side {
        // Buyer willing to pay >= lowest ask
        Side::Buy => opposite <= limit,
        // Seller willing to accept <= highest bid
        Side::Sell => opposite >= limit,
    }
}

impl SymbolBook {
    /// Match and/or rest a buy order. Returns its log lines in order.
    pub fn buy_order(&mut self, book: BookId, order: &Order, store: &mut OrderStore) -> Vec<LogLine> {
        self.place(book, Side::Buy, order, store)
    }

    /// Match and/or rest a sell order. Returns its log lines in order.
    pub fn sell_order(&mut self, book: BookId, order: &Order, store: &mut OrderStore) -> Vec<LogLine> {
        self.place(book, Side::Sell, order, store)
    }

    /// # Algorithm
    /// 1. Acknowledge
    /// 2. Cross against the opposite side
    /// 3. If anything traded, report the opposite side's new top of book
    /// 4. Rest a limit remainder; market remainders are dropped
    fn place(&mut self, book: BookId, side: Side, order: &Order, store: &mut OrderStore) -> Vec<LogLine> {
        let mut lines = vec![LogLine::Ack {
            user_id: order.user_id,
            user_order_id: order.user_order_id,
        }];
        let opposite = side.opposite();

        let (remaining, traded) = self.cross(side, order, store, &mut lines);
        if traded > 0 {
            self.refresh_best(opposite);
            lines.push(LogLine::BookUpdate {
                side: opposite,
                top: self.top_of_book(opposite),
            });
        }

        if remaining > 0 {
            if order.is_market() {
                trace!(user_id = order.user_id, remaining, "market remainder discarded");
            } else {
                self.rest(book, side, order, remaining, store, &mut lines);
            }
        }

        lines
    }

    /// Cross an incoming order against the opposite side.
    ///
    /// # Returns
    /// (remaining quantity, total quantity traded)
    fn cross(
        &mut self,
        side: Side,
        order: &Order,
        store: &mut OrderStore,
        lines: &mut Vec<LogLine>,
    ) -> (u32, u64) {
        let opposite = side.opposite();
        let mut remaining = order.quantity;
        let mut traded = 0u64;

        let mut cursor = self
            .best_price(opposite)
            .and_then(|price| self.level_id(opposite, price).map(|id| (price, id)));

        while remaining > 0 {
            let Some((price, level)) = cursor else {
                break;
            };
            if !order.is_market() && !crosses(side, order.price, price) {
                break;
            }

            traded += self.match_at_level(side, order, level, &mut remaining, store, lines);
            if remaining == 0 {
                break;
            }

            // Level exhausted (filled or only self-orders left): move one level worse
            cursor = self.next_live_level(opposite, price);
        }

        (remaining, traded)
    }

    /// Match against the orders of one level.
    ///
    /// Orders of the taker's own user are skipped, not consumed.
    ///
    /// # Returns
    /// Quantity traded at this level
    fn match_at_level(
        &mut self,
        side: Side,
        taker: &Order,
        level_id: LevelId,
        remaining: &mut u32,
        store: &mut OrderStore,
        lines: &mut Vec<LogLine>,
    ) -> u64 {
        let level = self.level_mut(level_id);
        let price = level.price;
        let mut traded = 0u64;

        let mut cursor = match side {
            Side::Buy => level.head,
            Side::Sell => level.tail,
        };

        while *remaining > 0 && cursor != NULL_INDEX {
            let maker = *store.arena.get(cursor);
            let following = match side {
                Side::Buy => maker.next,
                Side::Sell => maker.prev,
            };

            if maker.user_id == taker.user_id {
                trace!(
                    user_id = maker.user_id,
                    user_order_id = maker.user_order_id,
                    "self-trade skipped"
                );
                cursor = following;
                continue;
            }

            let qty = (*remaining).min(maker.qty);
            lines.push(match side {
                Side::Buy => LogLine::Trade {
                    buy_user_id: taker.user_id,
                    buy_order_id: taker.user_order_id,
                    sell_user_id: maker.user_id,
                    sell_order_id: maker.user_order_id,
                    price,
                    quantity: qty,
                },
                Side::Sell => LogLine::Trade {
                    buy_user_id: maker.user_id,
                    buy_order_id: maker.user_order_id,
                    sell_user_id: taker.user_id,
                    sell_order_id: taker.user_order_id,
                    price,
                    quantity: qty,
                },
            });

            *remaining -= qty;
            traded += qty as u64;
            level.subtract_qty(qty);

            if qty == maker.qty {
                // Maker fully filled - unlink, unindex, free
                level.detach(&mut store.arena, cursor);
                store.forget(maker.user_order_id);
                store.arena.free(cursor);
            } else {
                store.arena.get_mut(cursor).qty = maker.qty - qty;
            }

            cursor = following;
        }

        traded
    }

    /// Rest a limit order's remainder in the book (passive posting).
    fn rest(
        &mut self,
        book: BookId,
        side: Side,
        order: &Order,
        qty: u32,
        store: &mut OrderStore,
        lines: &mut Vec<LogLine>,
    ) {
        let level = self.level_for(side, order.price);
        let node = store
            .arena
            .alloc(OrderNode::new(order.user_id, order.user_order_id, order.price, qty));
        self.level_mut(level).push_back(&mut store.arena, node);

        self.update_best_price_on_add(side, order.price);
        if self.best_price(side) == Some(order.price) {
            lines.push(LogLine::BookUpdate {
                side,
                top: self.top_of_book(side),
            });
        }

        store.register(order.user_order_id, OrderLocation { book, side, level, node });
    }

    /// Remove a resting order located through the cancel index.
    ///
    /// With `release_qty == false` the level keeps the cancelled quantity in
    /// its total, so top of book keeps reporting it.
    pub fn cancel_resting(
        &mut self,
        location: &OrderLocation,
        arena: &mut Arena,
        release_qty: bool,
    ) -> RestingOrder {
        let resting = RestingOrder::from(arena.get(location.node));
        let level = self.level_mut(location.level);

        if release_qty {
            level.remove(arena, location.node);
        } else {
            level.detach(arena, location.node);
        }
        arena.free(location.node);

        if release_qty {
            self.refresh_best(location.side);
        }
        resting
    }
}
