//! UDP order client: sends the orders of a scenario fixture to the server.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use lob_relay::scenario::load_scenarios;
use lob_relay::{OrderSubmitter, TransportConfig, UdpSender};

#[derive(Parser, Debug)]
#[command(name = "lob-client", about = "Send fixture orders to a lob-server over UDP")]
struct Args {
    /// Order input fixture
    #[arg(long, default_value = "data/inputfile.csv")]
    input: PathBuf,

    /// Server address
    #[arg(long, default_value = "[::1]:8888")]
    address: SocketAddr,

    /// Only send this scenario (1-based); all scenarios by default
    #[arg(long)]
    scenario: Option<usize>,

    #[arg(long, default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_target(false)
        .init();

    let scenarios = load_scenarios(&args.input)?;
    info!(count = scenarios.len(), input = %args.input.display(), "scenarios loaded");

    let transport = TransportConfig {
        address: args.address,
        ..TransportConfig::default()
    };
    let submitter = OrderSubmitter::spawn(UdpSender::connect(&transport)?)?;

    for (number, scenario) in scenarios.iter().enumerate().map(|(i, s)| (i + 1, s)) {
        if args.scenario.is_some_and(|wanted| wanted != number) {
            continue;
        }
        info!(number, name = %scenario.name, orders = scenario.records.len(), "sending scenario");
        for order in &scenario.records {
            submitter.submit(order.clone());
        }
    }

    let sent = submitter.finish()?;
    if sent == 0 {
        warn!("no orders sent");
    }
    info!(sent, "done");
    Ok(())
}
