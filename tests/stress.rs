//! Stress Tests - Push the engine to its limits.
//!
//! These tests verify correctness under extreme conditions:
//! - Operation past the pre-allocated capacity
//! - High contention at single price levels
//! - Rapid order churn and flushes
//! - Maximum values for prices and quantities
//! - Long pipeline runs with many flush barriers

use lob_relay::{
    CancelAccounting, Engine, EngineConfig, FileSink, IterSource, LogLine, Order, OrderSubmitter,
    Side, SinkConfig,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::mpsc;

fn engine_with_capacity(order_capacity: u32) -> Engine {
    Engine::new(EngineConfig {
        order_capacity,
        ..EngineConfig::default()
    })
}

fn process(engine: &mut Engine, order: Order) -> Vec<LogLine> {
    engine.process_order(&order).expect("not a flush")
}

fn trades(lines: &[LogLine]) -> Vec<(u32, u32, u32, u32, u64, u32)> {
    lines
        .iter()
        .filter_map(|l| match *l {
            LogLine::Trade {
                buy_user_id,
                buy_order_id,
                sell_user_id,
                sell_order_id,
                price,
                quantity,
            } => Some((buy_user_id, buy_order_id, sell_user_id, sell_order_id, price, quantity)),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Capacity Stress Tests
// ============================================================================

#[test]
fn test_growth_past_capacity() {
    const CAPACITY: u32 = 100;
    let mut engine = engine_with_capacity(CAPACITY);

    for i in 1..=CAPACITY * 10 {
        // Non-overlapping prices: bids 8000-8099, asks 10000-10099
        let order = if i % 2 == 0 {
            Order::buy(1, i, "IBM", 8000 + (i % 100) as u64, 100)
        } else {
            Order::sell(1, i, "IBM", 10_000 + (i % 100) as u64, 100)
        };
        let lines = process(&mut engine, order);
        assert_eq!(lines[0], LogLine::Ack { user_id: 1, user_order_id: i });
    }

    assert_eq!(engine.registry().order_count(), (CAPACITY * 10) as usize);
    assert_eq!(engine.registry().resting_count(), CAPACITY * 10);
}

#[test]
fn test_slot_reuse_after_fill() {
    const CAPACITY: u32 = 16;
    let mut engine = engine_with_capacity(CAPACITY);

    for round in 0..100u32 {
        for i in 0..CAPACITY {
            process(&mut engine, Order::sell(1, round * CAPACITY + i + 1, "IBM", 10, 1));
        }
        let lines = process(&mut engine, Order::buy(2, round + 1, "IBM", 10, CAPACITY));
        assert_eq!(trades(&lines).len(), CAPACITY as usize);
        assert_eq!(engine.registry().resting_count(), 0);
    }
}

// ============================================================================
// High Contention Tests
// ============================================================================

#[test]
fn test_single_price_level_contention() {
    let mut engine = engine_with_capacity(10_000);
    const ORDERS: u32 = 1000;

    for i in 1..=ORDERS {
        process(&mut engine, Order::sell(i % 100 + 1, i, "IBM", 10_000, 10));
    }
    assert_eq!(engine.registry().depth_at("IBM", Side::Sell, 10_000), (10_000, ORDERS));

    // Buyer 0 owns none of them, so the whole level fills
    let lines = process(&mut engine, Order::buy(0, 1, "IBM", 10_000, 10 * ORDERS));
    assert_eq!(trades(&lines).len(), ORDERS as usize);
    assert_eq!(lines.last(), Some(&LogLine::BookUpdate { side: Side::Sell, top: None }));
    assert_eq!(engine.registry().depth_at("IBM", Side::Sell, 10_000), (0, 0));
}

#[test]
fn test_buy_priority_under_contention() {
    let mut engine = engine_with_capacity(1000);

    for i in 1..=100 {
        process(&mut engine, Order::sell(i, 1, "IBM", 50, 5));
    }

    // Buys take the oldest sells first
    let lines = process(&mut engine, Order::buy(0, 1, "IBM", 50, 50));
    let sellers: Vec<u32> = trades(&lines).iter().map(|t| t.2).collect();
    assert_eq!(sellers, (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_sell_priority_under_contention() {
    let mut engine = engine_with_capacity(1000);

    for i in 1..=100 {
        process(&mut engine, Order::buy(i, 1, "IBM", 50, 5));
    }

    // Sells take the newest buys first
    let lines = process(&mut engine, Order::sell(0, 1, "IBM", 50, 50));
    let buyers: Vec<u32> = trades(&lines).iter().map(|t| t.0).collect();
    assert_eq!(buyers, (91..=100).rev().collect::<Vec<_>>());
}

#[test]
fn test_self_orders_skipped_under_contention() {
    let mut engine = engine_with_capacity(1000);

    // Alternate the taker's own sells with other users' sells
    for i in 1..=50 {
        process(&mut engine, Order::sell(7, i, "IBM", 50, 1));
        process(&mut engine, Order::sell(100 + i, 1, "IBM", 50, 1));
    }

    let lines = process(&mut engine, Order::buy(7, 1000, "IBM", 50, 100));
    let fills = trades(&lines);
    assert_eq!(fills.len(), 50);
    assert!(fills.iter().all(|t| t.2 != 7));

    // Remainder rests on the bid while the user's own asks stay put
    assert_eq!(engine.registry().best_bid("IBM"), Some(50));
    assert_eq!(engine.registry().depth_at("IBM", Side::Sell, 50), (50, 50));
}

// ============================================================================
// Rapid Churn Tests
// ============================================================================

#[test]
fn test_rapid_add_cancel_cycles() {
    let mut engine = engine_with_capacity(100);

    for cycle in 1..=10_000u32 {
        process(&mut engine, Order::buy(1, cycle * 2, "IBM", 100, 10));
        let lines = process(&mut engine, Order::cancel(1, cycle * 2));
        assert_eq!(
            lines,
            vec![
                LogLine::CancelAck { user_id: 1, user_order_id: cycle * 2, new_id: cycle * 2 + 1 },
                LogLine::Ack { user_id: 1, user_order_id: cycle * 2 + 1 },
            ]
        );
    }

    assert_eq!(engine.registry().order_count(), 0);
    assert_eq!(engine.registry().resting_count(), 0);
}

#[test]
fn test_rapid_match_cycles() {
    let mut engine = engine_with_capacity(100);

    for cycle in 1..=10_000u32 {
        process(&mut engine, Order::sell(1, cycle, "IBM", 100, 10));
        let lines = process(&mut engine, Order::buy(2, cycle, "IBM", 100, 10));
        assert_eq!(trades(&lines), vec![(2, cycle, 1, cycle, 100, 10)]);
    }

    assert_eq!(engine.registry().resting_count(), 0);
    // Emptied levels are kept for reuse
    assert_eq!(engine.registry().book("IBM").unwrap().level_count(Side::Sell), 1);
}

#[test]
fn test_flush_churn() {
    let mut engine = engine_with_capacity(64);

    for round in 0..1_000u32 {
        for i in 0..10 {
            process(&mut engine, Order::buy(i, round, &format!("S{}", i % 3), 100 + i as u64, 10));
        }
        assert!(engine.process_order(&Order::flush()).is_none());
        assert_eq!(engine.registry().symbol_count(), 0);
        assert_eq!(engine.registry().resting_count(), 0);
    }
}

// ============================================================================
// Edge Case Tests
// ============================================================================

#[test]
fn test_max_price() {
    let mut engine = engine_with_capacity(100);

    let lines = process(&mut engine, Order::sell(1, 1, "IBM", u64::MAX, 100));
    assert_eq!(lines[1], LogLine::BookUpdate { side: Side::Sell, top: Some((u64::MAX, 100)) });

    let lines = process(&mut engine, Order::buy(2, 1, "IBM", u64::MAX, 100));
    assert_eq!(trades(&lines), vec![(2, 1, 1, 1, u64::MAX, 100)]);
}

#[test]
fn test_max_quantity_aggregates() {
    let mut engine = engine_with_capacity(100);

    process(&mut engine, Order::buy(1, 1, "IBM", 10, u32::MAX));
    let lines = process(&mut engine, Order::buy(2, 1, "IBM", 10, u32::MAX));

    // Level totals are wider than order quantities
    let total = u32::MAX as u64 * 2;
    assert_eq!(lines[1], LogLine::BookUpdate { side: Side::Buy, top: Some((10, total)) });
}

#[test]
fn test_quantity_one() {
    let mut engine = engine_with_capacity(100);

    process(&mut engine, Order::sell(1, 1, "IBM", 10, 1));
    let lines = process(&mut engine, Order::buy(2, 1, "IBM", 10, 1));

    assert_eq!(trades(&lines), vec![(2, 1, 1, 1, 10, 1)]);
    assert_eq!(engine.registry().best_ask("IBM"), None);
}

#[test]
fn test_many_price_levels_sweep() {
    let mut engine = engine_with_capacity(2000);

    for i in 0..1000u32 {
        process(&mut engine, Order::sell(1, i + 1, "IBM", 1000 + i as u64, 1));
    }

    // A market buy walks every level from the best
    let lines = process(&mut engine, Order::buy(2, 1, "IBM", 0, 2000));
    let prices: Vec<u64> = trades(&lines).iter().map(|t| t.4).collect();
    assert_eq!(prices, (1000..2000).collect::<Vec<_>>());
    assert_eq!(engine.registry().resting_order(1), None);
}

#[test]
fn test_double_cancel_mints_two_ids() {
    let mut engine = engine_with_capacity(100);
    process(&mut engine, Order::sell(1, 10, "IBM", 10, 5));

    let first = process(&mut engine, Order::cancel(1, 10));
    let second = process(&mut engine, Order::cancel(1, 10));

    assert_eq!(first[0], LogLine::CancelAck { user_id: 1, user_order_id: 10, new_id: 11 });
    assert_eq!(second[0], LogLine::CancelAck { user_id: 1, user_order_id: 10, new_id: 12 });
}

#[test]
fn test_cancel_after_partial_fill_release() {
    let mut engine = Engine::new(EngineConfig {
        cancel_accounting: CancelAccounting::Release,
        ..EngineConfig::default()
    });

    process(&mut engine, Order::sell(1, 1, "IBM", 10, 100));
    process(&mut engine, Order::buy(2, 1, "IBM", 10, 40));
    assert_eq!(engine.registry().depth_at("IBM", Side::Sell, 10), (60, 1));

    process(&mut engine, Order::cancel(1, 1));
    assert_eq!(engine.registry().depth_at("IBM", Side::Sell, 10), (0, 0));
    assert_eq!(engine.registry().best_ask("IBM"), None);
}

// ============================================================================
// Large Scale
// ============================================================================

#[test]
fn test_large_random_workload() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
    let mut engine = engine_with_capacity(1024);
    let mut next_id = 0u32;

    for _ in 0..200_000 {
        next_id += 1;
        let user = rng.gen_range(1..50);
        let price = rng.gen_range(90..110);
        let qty = rng.gen_range(1..100);
        let order = match rng.gen_range(0..10) {
            0..=3 => Order::buy(user, next_id, "IBM", price, qty),
            4..=7 => Order::sell(user, next_id, "IBM", price, qty),
            _ => Order::cancel(user, rng.gen_range(1..=next_id)),
        };
        let lines = process(&mut engine, order);
        assert!(!lines.is_empty());
    }

    let registry = engine.registry();
    assert!(registry.order_count() <= registry.resting_count() as usize);
}

#[test]
fn test_pipeline_many_flushes_to_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = SinkConfig {
        log_dir: dir.path().to_path_buf(),
        echo: false,
    };

    let mut orders = Vec::new();
    for batch in 1..=50u32 {
        for i in 0..batch {
            orders.push(Order::buy(batch, i + 1, "IBM", 10, 1));
        }
        orders.push(Order::flush());
    }

    let (_, summary) = Engine::default()
        .run(IterSource::new(orders), FileSink::new(&config).unwrap())
        .unwrap();
    assert_eq!(summary.batches, 50);

    for batch in 1..=50u32 {
        let path = dir.path().join(format!("{batch}.log"));
        let text = std::fs::read_to_string(&path).unwrap();
        // Every resting buy joins the best bid, so each gets a book update
        assert_eq!(text.lines().count(), batch as usize * 2, "{}", path.display());
        assert!(text.lines().all(|l| l.starts_with("A, ") || l.starts_with("B, B, 10, ")));
    }
    assert!(!dir.path().join("51.log").exists());
}

#[test]
fn test_submitter_feeds_running_engine() {
    let (tx, rx) = mpsc::channel();
    let sink = std::sync::Arc::new(std::sync::Mutex::new(lob_relay::MemorySink::new()));
    let running = Engine::default().start(rx, std::sync::Arc::clone(&sink)).unwrap();

    let submitter = OrderSubmitter::spawn(tx).unwrap();
    for i in 1..=1000u32 {
        submitter.submit(Order::sell(1, i, "IBM", 10, 1));
    }
    submitter.submit(Order::flush());
    submitter.submit(Order::buy(2, 1, "IBM", 10, 5));
    assert_eq!(submitter.finish().unwrap(), 1002);

    let (engine, summary) = running.join().unwrap();
    assert_eq!(summary.orders, 1002);
    assert_eq!(summary.batches, 2);
    assert_eq!(engine.registry().best_bid("IBM"), Some(10));

    let sink = sink.lock().unwrap();
    assert_eq!(sink.batches()[0].len(), 2000);
    assert_eq!(sink.batches()[1], vec!["A, 2, 1", "B, B, 10, 5"]);
}
