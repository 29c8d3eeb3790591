//! Parameter sweep driver
//!
//! Enumerates arrival-rate × mode combinations, replicates each
//! configuration with distinct seeds, pools the records, and writes one
//! CSV row of group metrics per configuration.

use metrics::{compute_group_metrics, Mode};
use serde::Serialize;
use sim::{simulate_server, ArrivalPattern, ServiceDist, SimConfig};

#[derive(Serialize)]
struct SweepRow {
    mode: &'static str,
    rate_rps: f64,
    cpu_mean_ms: f64,
    io_mean_ms: f64,
    thread_count: usize,
    io_limit: usize,
    queue_limit: usize,
    timeout_ms: f64,
    replications: usize,
    completed: u64,
    dropped: u64,
    timed_out: u64,
    throughput_rps: f64,
    success_rate: f64,
    saturation: f64,
    p95_latency_ms: Option<f64>,
    p99_latency_ms: Option<f64>,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let out_path = args.get(1).map(|s| s.as_str()).unwrap_or("sweep.csv");

    let rates = [25.0, 50.0, 100.0, 200.0, 400.0];
    let replications = 5;
    let cpu_mean_ms = 2.0;
    let io_mean_ms = 20.0;

    let mut writer = csv::Writer::from_path(out_path).expect("Failed to open output file");

    for mode in [Mode::Sync, Mode::Async] {
        for rate_rps in rates {
            let base = SimConfig {
                mode,
                thread_count: 4,
                io_limit: 64,
                queue_limit: 50,
                rate_rps,
                arrival: ArrivalPattern::Poisson,
                cpu: ServiceDist::Exponential {
                    mean_ms: cpu_mean_ms,
                },
                io: ServiceDist::Exponential {
                    mean_ms: io_mean_ms,
                },
                timeout_ms: 500.0,
                sim_time_ms: 20_000.0,
                warmup_ms: 2_000.0,
                seed: 42,
            };

            // Pool raw records across replications; percentiles are
            // computed over the union, not averaged per replication
            let mut pooled = Vec::new();
            for rep in 0..replications {
                let mut cfg = base.clone();
                cfg.seed = base.seed + rep as u64;
                let run = simulate_server(&cfg).expect("invalid configuration");
                pooled.extend(run.records);
            }
            let m = compute_group_metrics(&pooled, &base.window(replications));

            println!(
                "{:>5} rate={:>5.0}  ->  {:>6.1} req/s  success {:>5.1}%  saturation {:>5.1}%",
                mode.as_str(),
                rate_rps,
                m.throughput_rps,
                m.success_rate * 100.0,
                m.saturation * 100.0,
            );

            writer
                .serialize(SweepRow {
                    mode: mode.as_str(),
                    rate_rps,
                    cpu_mean_ms,
                    io_mean_ms,
                    thread_count: base.thread_count,
                    io_limit: base.io_limit,
                    queue_limit: base.queue_limit,
                    timeout_ms: base.timeout_ms,
                    replications,
                    completed: m.completed,
                    dropped: m.dropped,
                    timed_out: m.timed_out,
                    throughput_rps: m.throughput_rps,
                    success_rate: m.success_rate,
                    saturation: m.saturation,
                    p95_latency_ms: m.p95_latency_ms,
                    p99_latency_ms: m.p99_latency_ms,
                })
                .expect("Failed to write row");
        }
    }

    writer.flush().expect("Failed to flush output");
    println!("Wrote {}", out_path);
}
