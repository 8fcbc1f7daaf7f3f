//! Wire codec - one order per datagram.
//!
//! Orders travel as a bincode-encoded [`WireOrder`] whose kind is a raw tag
//! byte, so a peer sending an unknown kind is caught at decode time.

use serde::{Deserialize, Serialize};

use crate::command::{Order, OrderKind};
use crate::error::Result;

/// Largest payload a single UDP datagram can carry
pub const MAX_DATAGRAM: usize = 65_507;

#[derive(Serialize, Deserialize)]
struct WireOrder {
    user_id: u32,
    user_order_id: u32,
    kind: u8,
    symbol: String,
    price: u64,
    quantity: u32,
}

/// Serialize an order into a datagram payload.
pub fn encode(order: &Order) -> Result<Vec<u8>> {
    let wire = WireOrder {
        user_id: order.user_id,
        user_order_id: order.user_order_id,
        kind: order.kind as u8,
        symbol: order.symbol.clone(),
        price: order.price,
        quantity: order.quantity,
    };
    Ok(bincode::serialize(&wire)?)
}

/// Parse a datagram payload. Malformed payloads and unknown kinds are errors.
pub fn decode(bytes: &[u8]) -> Result<Order> {
    let wire: WireOrder = bincode::deserialize(bytes)?;
    Ok(Order {
        user_id: wire.user_id,
        user_order_id: wire.user_order_id,
        kind: OrderKind::try_from(wire.kind)?,
        symbol: wire.symbol,
        price: wire.price,
        quantity: wire.quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_order_survives_the_wire() {
        let order = Order::sell(7, 42, "IBM", 0, 250);
        let bytes = encode(&order).unwrap();
        assert!(bytes.len() < MAX_DATAGRAM);
        assert_eq!(decode(&bytes).unwrap(), order);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let mut bytes = encode(&Order::flush()).unwrap();
        // Fixed-width ints: user_id (4) + user_order_id (4), then the kind tag
        bytes[8] = 9;

        match decode(&bytes) {
            Err(EngineError::UnknownOrderKind(tag)) => assert_eq!(tag, "9"),
            other => panic!("expected unknown kind, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let bytes = encode(&Order::buy(1, 1, "IBM", 10, 5)).unwrap();
        assert!(matches!(decode(&bytes[..6]), Err(EngineError::Codec(_))));
    }
}
