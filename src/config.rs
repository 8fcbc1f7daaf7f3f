//! Runtime configuration.
//!
//! Binaries fill these from command-line flags; library users construct
//! them directly or start from `Default`.

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::path::PathBuf;
use std::time::Duration;

/// Default UDP port shared by client and server
pub const DEFAULT_PORT: u16 = 8888;

/// A receive that waits longer than this means the input is over
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// What a cancel does to its price level's aggregate quantity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CancelAccounting {
    /// Unlink the order but leave the level total untouched, so top of book
    /// keeps reporting the cancelled quantity until it is traded away.
    /// Matches the reference log fixtures.
    #[default]
    Retain,
    /// Subtract the cancelled remainder from the level total.
    Release,
}

/// Matching engine settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Order nodes pre-allocated at startup (the arena grows past this)
    pub order_capacity: u32,
    /// Level total bookkeeping on cancel
    pub cancel_accounting: CancelAccounting,
    /// Pin the ingest thread to the last CPU core
    pub pin_ingest_core: bool,
    /// Pre-fault order memory before the first order arrives
    pub warm_up: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order_capacity: 65_536,
            cancel_accounting: CancelAccounting::Retain,
            pin_ingest_core: false,
            warm_up: false,
        }
    }
}

/// Datagram transport settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// Address the server binds / the client sends to
    pub address: SocketAddr,
    /// Receive timeout that ends the input stream
    pub recv_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, DEFAULT_PORT, 0, 0)),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        }
    }
}

/// Log sink settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    /// Directory receiving `<batch>.log` files
    pub log_dir: PathBuf,
    /// Mirror every line to the tracing output
    pub echo: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            echo: true,
        }
    }
}
