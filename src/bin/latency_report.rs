use std::time::{Duration, Instant};

use clap::Parser;
use hdrhistogram::Histogram;

use lob_relay::{Engine, EngineConfig, Order};

#[derive(Parser, Debug)]
#[command(name = "latency-report", about = "Per-order matching latency profile")]
struct Args {
    /// Orders to process
    #[arg(long, default_value_t = 1_000_000)]
    iterations: u64,

    /// Distinct symbols the orders are spread over
    #[arg(long, default_value_t = 4)]
    symbols: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    println!("Preparing Latency Benchmark...");

    let mut engine = Engine::new(EngineConfig {
        order_capacity: 100_000,
        ..EngineConfig::default()
    });
    engine.warm_up();

    let symbols: Vec<String> = (0..args.symbols.max(1)).map(|i| format!("SYM{i}")).collect();
    let mut histogram = Histogram::<u64>::new_with_bounds(1, 1_000_000, 3)?;
    let mut total_duration = Duration::ZERO;

    println!("Running {} iterations...", args.iterations);

    for i in 0..args.iterations {
        // Ten users over a 100-tick band; user 9 only cancels
        let user = (i % 10) as u32;
        let user_order_id = (i / 10) as u32 + 1;
        let symbol = &symbols[(i % symbols.len() as u64) as usize];
        let price = 10_000 + (i * 7) % 100;
        let order = if i % 10 == 9 && user_order_id > 1 {
            Order::cancel(user, user_order_id - 1)
        } else if (i / 3) % 2 == 0 {
            Order::buy(user, user_order_id, symbol.as_str(), price, 10)
        } else {
            Order::sell(user, user_order_id, symbol.as_str(), price, 10)
        };

        // Critical measurement section
        let start = Instant::now();
        std::hint::black_box(engine.process_order(&order));
        let elapsed = start.elapsed();

        // Outliers past the histogram bound are dropped
        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total_duration += elapsed;
    }

    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {}", args.iterations);
    println!("Resting:    {}", engine.registry().resting_count());
    println!(
        "Throughput: {:.2} ops/sec",
        args.iterations as f64 / total_duration.as_secs_f64()
    );
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");

    println!("\nDistribution:");
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:8} ns: {:10} count", v.value_iterated_to(), count);
        }
    }
    Ok(())
}
