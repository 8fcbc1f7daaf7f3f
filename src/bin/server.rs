//! UDP order server: receives orders until the socket goes quiet and
//! writes each flush batch of log lines to `<log dir>/<n>.log`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use lob_relay::{
    CancelAccounting, Engine, EngineConfig, FileSink, SinkConfig, TransportConfig, UdpReceiver,
};

#[derive(Parser, Debug)]
#[command(name = "lob-server", about = "Match orders received over UDP and publish the log")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "[::1]:8888")]
    address: SocketAddr,

    /// Stop after this many milliseconds without a datagram
    #[arg(long, default_value_t = 2_000)]
    timeout_ms: u64,

    /// Directory receiving the batch log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Do not mirror log lines to the console
    #[arg(long)]
    quiet: bool,

    /// Level total bookkeeping on cancel
    #[arg(long, value_enum, default_value_t = CancelAccounting::Retain)]
    cancel_accounting: CancelAccounting,

    /// Pre-allocated order capacity
    #[arg(long, default_value_t = 65_536)]
    capacity: u32,

    /// Pin the ingest thread to the last CPU core
    #[arg(long)]
    pin: bool,

    #[arg(long, default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_target(false)
        .init();

    let transport = TransportConfig {
        address: args.address,
        recv_timeout: Duration::from_millis(args.timeout_ms),
    };
    let sink = SinkConfig {
        log_dir: args.log_dir,
        echo: !args.quiet,
    };
    let engine = EngineConfig {
        order_capacity: args.capacity,
        cancel_accounting: args.cancel_accounting,
        pin_ingest_core: args.pin,
        warm_up: true,
    };

    let receiver = UdpReceiver::bind(&transport)?;
    info!(address = %receiver.local_addr()?, "lob-server ready");

    let (_, summary) = Engine::new(engine).run(receiver, FileSink::new(&sink)?)?;

    info!(
        orders = summary.orders,
        lines = summary.lines,
        batches = summary.batches,
        "input exhausted, shutting down"
    );
    Ok(())
}
