//! Replay fixture scenarios through the engine in-process and compare each
//! published batch against the expected output.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::{error, info, warn};

use lob_relay::scenario::{load_expected, load_scenarios};
use lob_relay::{CancelAccounting, Engine, EngineConfig, IterSource, MemorySink};

#[derive(Parser, Debug)]
#[command(name = "replay", about = "Replay scenario fixtures and diff the published log")]
struct Args {
    /// Order input fixture
    #[arg(long, default_value = "data/inputfile.csv")]
    input: PathBuf,

    /// Expected output fixture
    #[arg(long, default_value = "data/outputfile.csv")]
    expected: PathBuf,

    /// Level total bookkeeping on cancel
    #[arg(long, value_enum, default_value_t = CancelAccounting::Retain)]
    cancel_accounting: CancelAccounting,

    #[arg(long, default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_target(false)
        .init();

    let scenarios = load_scenarios(&args.input)?;
    let expected = load_expected(&args.expected)?;

    let orders: Vec<_> = scenarios.into_iter().flat_map(|s| s.records).collect();
    let sink = Arc::new(Mutex::new(MemorySink::new()));
    let config = EngineConfig {
        cancel_accounting: args.cancel_accounting,
        ..EngineConfig::default()
    };

    let (_, summary) = Engine::new(config).run(IterSource::new(orders), Arc::clone(&sink))?;
    info!(orders = summary.orders, batches = summary.batches, "replay finished");

    let batches = match sink.lock() {
        Ok(sink) => sink.batches().to_vec(),
        Err(poisoned) => poisoned.into_inner().batches().to_vec(),
    };

    let mut failures = 0;
    for (number, want) in expected.iter().enumerate().map(|(i, s)| (i + 1, s)) {
        let got = batches.get(number - 1).map(Vec::as_slice).unwrap_or_default();
        if got == want.records.as_slice() {
            info!(number, lines = got.len(), "scenario ok");
            continue;
        }

        failures += 1;
        error!(number, name = %want.name, "scenario mismatch");
        let len = got.len().max(want.records.len());
        for i in 0..len {
            let g = got.get(i).map_or("<missing>", String::as_str);
            let w = want.records.get(i).map_or("<missing>", String::as_str);
            if g != w {
                warn!(line = i + 1, expected = w, actual = g, "differs");
            }
        }
    }

    if batches.len() > expected.len() {
        warn!(extra = batches.len() - expected.len(), "more batches than expected scenarios");
    }

    if failures == 0 {
        info!(scenarios = expected.len(), "all scenarios match");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(failures, "replay failed");
        Ok(ExitCode::FAILURE)
    }
}
