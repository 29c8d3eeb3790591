//! Sync vs async comparison runner
//!
//! Runs both disciplines on one workload preset with the same seed and
//! prints the golden signals side by side.

use metrics::{compute_time_metrics, Mode};
use sim::{simulate_server, ArrivalPattern, ServiceDist, SimConfig};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let preset = args.get(1).map(|s| s.as_str()).unwrap_or("io_bound");
    let show_bins = args.iter().any(|a| a == "--bins");

    let (cpu_mean_ms, io_mean_ms) = match preset {
        "io_bound" => (2.0, 50.0),
        "balanced" => (10.0, 10.0),
        "cpu_bound" => (20.0, 2.0),
        _ => {
            eprintln!("Unknown preset: {}", preset);
            eprintln!("Usage: compare [io_bound|balanced|cpu_bound] [--bins]");
            std::process::exit(1);
        }
    };

    println!("Running sync vs async with {} preset", preset);

    for mode in [Mode::Sync, Mode::Async] {
        let cfg = SimConfig {
            mode,
            thread_count: 4,
            io_limit: 64,
            queue_limit: 100,
            rate_rps: 200.0,
            arrival: ArrivalPattern::Poisson,
            cpu: ServiceDist::Exponential {
                mean_ms: cpu_mean_ms,
            },
            io: ServiceDist::Exponential {
                mean_ms: io_mean_ms,
            },
            timeout_ms: 1000.0,
            sim_time_ms: 30_000.0,
            warmup_ms: 2_000.0,
            seed: 42,
        };
        let run = simulate_server(&cfg).expect("invalid configuration");
        let m = &run.metrics;

        println!("\n=== {} ===", mode.as_str());
        println!("arrivals: {}", run.counters.arrivals);
        println!(
            "completed: {}  dropped: {}  timed out: {}",
            m.completed, m.dropped, m.timed_out
        );
        println!("throughput: {:.2} req/s", m.throughput_rps);
        println!("success rate: {:.1}%", m.success_rate * 100.0);
        println!("saturation: {:.1}%", m.saturation * 100.0);
        println!("p95 latency: {}", fmt_ms(m.p95_latency_ms));
        println!("p99 latency: {}", fmt_ms(m.p99_latency_ms));

        if show_bins {
            println!("\n  t(s)  req/s  success  saturation  p95");
            for bin in compute_time_metrics(&run.records, &cfg.window(1), 5_000.0) {
                println!(
                    "  {:>4.0}  {:>5.1}  {:>6.1}%  {:>9.1}%  {}",
                    bin.time_ms / 1000.0,
                    bin.throughput_rps,
                    bin.success_rate * 100.0,
                    bin.saturation * 100.0,
                    fmt_ms(bin.p95_latency_ms),
                );
            }
        }
    }
}

fn fmt_ms(v: Option<f64>) -> String {
    match v {
        Some(ms) => format!("{:.2} ms", ms),
        None => "n/a".to_string(),
    }
}
