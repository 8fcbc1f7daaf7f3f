//! # LOB Relay
//!
//! A deterministic multi-symbol limit order matching engine that publishes
//! its protocol log in flush-delimited batches.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: The ingest thread owns every order book exclusively (no locks)
//! - **O(1) Cancel**: Orders are found through a handle index, never by scanning
//! - **Cache-Optimized**: 64-byte order nodes, 32-bit arena indices
//! - **Ordered Publication**: Lines from before a flush always reach the sink first
//!
//! ## Architecture
//!
//! ```text
//! [OrderSource] --> [Ingest Thread (BookRegistry)] --> [FlushBarrierQueue] --> [Publish Thread]
//!   UDP / iter                 |                                                   |
//!                       [SymbolBook per symbol]                              [LogSink: <n>.log]
//! ```

pub mod arena;
pub mod codec;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod flush_queue;
pub mod matching;
pub mod order_book;
pub mod price_level;
pub mod registry;
pub mod scenario;
pub mod sink;
pub mod submitter;
pub mod transport;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};
pub use command::{LogLine, Order, OrderKind, Side, TopOfBook};
pub use config::{CancelAccounting, EngineConfig, SinkConfig, TransportConfig};
pub use engine::{Engine, Publication, RunSummary, RunningEngine};
pub use error::{EngineError, Result};
pub use flush_queue::FlushBarrierQueue;
pub use order_book::{OrderId, RestingOrder, SymbolBook};
pub use price_level::PriceLevel;
pub use registry::BookRegistry;
pub use sink::{FileSink, LogSink, MemorySink};
pub use submitter::OrderSubmitter;
pub use transport::{IterSource, OrderSource, OrderTransport, UdpReceiver, UdpSender};
