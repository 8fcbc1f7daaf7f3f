//! Order and Log Line types for the matching engine.
//!
//! Orders are inputs from the ingest thread.
//! Log lines are the protocol output persisted by the publish thread.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Market side
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Buy = 0,
    /// Sell side (asks)
    Sell = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Single-letter tag used in book update lines
    #[inline]
    pub const fn tag(self) -> char {
        match self {
            Side::Buy => 'B',
            Side::Sell => 'S',
        }
    }
}

/// What an incoming order asks the engine to do
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderKind {
    Buy = 0,
    Sell = 1,
    Cancel = 2,
    Flush = 3,
}

impl OrderKind {
    /// Side of a new order, `None` for cancel and flush
    #[inline]
    pub const fn side(self) -> Option<Side> {
        match self {
            OrderKind::Buy => Some(Side::Buy),
            OrderKind::Sell => Some(Side::Sell),
            OrderKind::Cancel | OrderKind::Flush => None,
        }
    }
}

impl TryFrom<u8> for OrderKind {
    type Error = EngineError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(OrderKind::Buy),
            1 => Ok(OrderKind::Sell),
            2 => Ok(OrderKind::Cancel),
            3 => Ok(OrderKind::Flush),
            other => Err(EngineError::UnknownOrderKind(other.to_string())),
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderKind::Buy => "BUY",
            OrderKind::Sell => "SELL",
            OrderKind::Cancel => "CANCEL",
            OrderKind::Flush => "FLUSH",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Input Orders
// ============================================================================

/// A single event on the ordered input stream.
///
/// Cancel orders only carry `user_id` and `user_order_id`; flush orders carry
/// nothing meaningful beyond their kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Trader/user ID
    pub user_id: u32,
    /// Client-assigned order ID, scoped to the user
    pub user_order_id: u32,
    /// Buy, sell, cancel or flush
    pub kind: OrderKind,
    /// Instrument symbol
    pub symbol: String,
    /// Limit price, 0 = market order
    pub price: u64,
    /// Order quantity
    pub quantity: u32,
}

impl Order {
    /// New limit (or market, when `price == 0`) buy order
    pub fn buy(user_id: u32, user_order_id: u32, symbol: impl Into<String>, price: u64, quantity: u32) -> Self {
        Self {
            user_id,
            user_order_id,
            kind: OrderKind::Buy,
            symbol: symbol.into(),
            price,
            quantity,
        }
    }

    /// New limit (or market, when `price == 0`) sell order
    pub fn sell(user_id: u32, user_order_id: u32, symbol: impl Into<String>, price: u64, quantity: u32) -> Self {
        Self {
            user_id,
            user_order_id,
            kind: OrderKind::Sell,
            symbol: symbol.into(),
            price,
            quantity,
        }
    }

    /// Cancel a resting order by its user-scoped ID
    pub fn cancel(user_id: u32, user_order_id: u32) -> Self {
        Self {
            user_id,
            user_order_id,
            kind: OrderKind::Cancel,
            symbol: String::new(),
            price: 0,
            quantity: 0,
        }
    }

    /// Registry-wide reset
    pub fn flush() -> Self {
        Self {
            user_id: 0,
            user_order_id: 0,
            kind: OrderKind::Flush,
            symbol: String::new(),
            price: 0,
            quantity: 0,
        }
    }

    /// Market orders trade against whatever is available and never rest
    #[inline]
    pub const fn is_market(&self) -> bool {
        self.price == 0
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.kind, self.user_id, self.symbol, self.price, self.quantity, self.user_order_id
        )
    }
}

// ============================================================================
// Output Log Lines
// ============================================================================

/// Best price and its aggregate quantity, `None` when the side has no market
pub type TopOfBook = Option<(u64, u64)>;

/// One protocol log line.
///
/// `Display` renders the exact comma-separated wire format, e.g.
/// `T, 1, 1, 2, 1, 10, 3`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogLine {
    /// `A, user, order`
    Ack { user_id: u32, user_order_id: u32 },
    /// `T, buy user, buy order, sell user, sell order, price, qty`
    Trade {
        buy_user_id: u32,
        buy_order_id: u32,
        sell_user_id: u32,
        sell_order_id: u32,
        price: u64,
        quantity: u32,
    },
    /// `B, side, price, qty` or `B, side, -, -`
    BookUpdate { side: Side, top: TopOfBook },
    /// `C, user, order, minted id`
    CancelAck {
        user_id: u32,
        user_order_id: u32,
        new_id: u32,
    },
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            LogLine::Ack { user_id, user_order_id } => write!(f, "A, {}, {}", user_id, user_order_id),
            LogLine::Trade {
                buy_user_id,
                buy_order_id,
                sell_user_id,
                sell_order_id,
                price,
                quantity,
            } => write!(
                f,
                "T, {}, {}, {}, {}, {}, {}",
                buy_user_id, buy_order_id, sell_user_id, sell_order_id, price, quantity
            ),
            LogLine::BookUpdate { side, top: Some((price, qty)) } => {
                write!(f, "B, {}, {}, {}", side.tag(), price, qty)
            }
            LogLine::BookUpdate { side, top: None } => write!(f, "B, {}, -, -", side.tag()),
            LogLine::CancelAck {
                user_id,
                user_order_id,
                new_id,
            } => write!(f, "C, {}, {}, {}", user_id, user_order_id, new_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_order_constructors() {
        let buy = Order::buy(1, 7, "IBM", 10, 100);
        assert_eq!(buy.kind, OrderKind::Buy);
        assert_eq!(buy.kind.side(), Some(Side::Buy));
        assert!(!buy.is_market());

        let market = Order::sell(2, 3, "IBM", 0, 5);
        assert!(market.is_market());

        assert_eq!(Order::cancel(1, 7).kind.side(), None);
        assert_eq!(Order::flush().kind, OrderKind::Flush);
    }

    #[test]
    fn test_order_kind_from_raw() {
        assert_eq!(OrderKind::try_from(2).unwrap(), OrderKind::Cancel);
        assert!(matches!(
            OrderKind::try_from(9),
            Err(EngineError::UnknownOrderKind(_))
        ));
    }

    #[test]
    fn test_log_line_format() {
        let ack = LogLine::Ack { user_id: 1, user_order_id: 2 };
        assert_eq!(ack.to_string(), "A, 1, 2");

        let trade = LogLine::Trade {
            buy_user_id: 1,
            buy_order_id: 1,
            sell_user_id: 2,
            sell_order_id: 1,
            price: 10,
            quantity: 3,
        };
        assert_eq!(trade.to_string(), "T, 1, 1, 2, 1, 10, 3");

        let bid = LogLine::BookUpdate { side: Side::Buy, top: Some((10, 2)) };
        assert_eq!(bid.to_string(), "B, B, 10, 2");

        let empty_ask = LogLine::BookUpdate { side: Side::Sell, top: None };
        assert_eq!(empty_ask.to_string(), "B, S, -, -");

        let cancel = LogLine::CancelAck { user_id: 1, user_order_id: 1, new_id: 4 };
        assert_eq!(cancel.to_string(), "C, 1, 1, 4");
    }

    #[test]
    fn test_order_display() {
        assert_eq!(Order::buy(1, 2, "IBM", 10, 100).to_string(), "BUY 1 IBM 10 100 2");
    }
}
