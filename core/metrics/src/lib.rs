//! Request Outcome Schema & Golden Signals
//!
//! Defines the finalized request record emitted by the simulation engine
//! and the aggregation into the four golden signals: throughput, latency,
//! success rate, saturation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Server concurrency discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Sync,
    Async,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sync => "sync",
            Mode::Async => "async",
        }
    }
}

/// Terminal status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Completed,
    Dropped,
    Timeout,
}

/// One finalized request
///
/// Frozen and emitted exactly once by the engine. Dropped requests never
/// entered service and carry no service timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: u64,
    pub mode: Mode,
    pub status: Status,
    pub arrival_ms: f64,
    /// First worker grant; `None` for dropped requests
    pub start_ms: Option<f64>,
    /// Completion or timeout instant; `None` for dropped requests
    pub finish_ms: Option<f64>,
    /// CPU time actually executed while holding a worker
    pub cpu_ms: f64,
}

impl RequestRecord {
    /// Sojourn time; defined only for completed and timed-out requests
    pub fn latency_ms(&self) -> Option<f64> {
        match self.status {
            Status::Dropped => None,
            Status::Completed | Status::Timeout => self.finish_ms.map(|f| f - self.arrival_ms),
        }
    }

    /// Instant the request left the system: finish time, or arrival time
    /// for requests dropped at the admission gate.
    pub fn departure_ms(&self) -> f64 {
        self.finish_ms.unwrap_or(self.arrival_ms)
    }
}

/// Run-level tallies, cross-checked against the record stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub arrivals: u64,
    pub completed: u64,
    pub dropped: u64,
    pub timed_out: u64,
}

/// Measurement window and normalization factors for aggregation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunWindow {
    pub warmup_ms: f64,
    pub sim_time_ms: f64,
    /// Effective worker-pool capacity (1 in async mode)
    pub worker_capacity: usize,
    /// Number of replications pooled into the record collection
    pub replications: usize,
}

impl RunWindow {
    pub fn span_ms(&self) -> f64 {
        self.sim_time_ms - self.warmup_ms
    }
}

/// Golden signals over one configuration (all replications pooled)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    pub completed: u64,
    pub dropped: u64,
    pub timed_out: u64,
    /// Completed requests per second of measurement window, per replication
    pub throughput_rps: f64,
    /// completed / (completed + dropped + timed_out)
    pub success_rate: f64,
    /// Fraction of available worker-time spent executing CPU phases
    pub saturation: f64,
    /// `None` when the window has no completed requests
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
}

/// Golden signals within one fixed-width time bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBin {
    /// Left edge of the bin
    pub time_ms: f64,
    pub completed: u64,
    pub dropped: u64,
    pub timed_out: u64,
    pub throughput_rps: f64,
    pub success_rate: f64,
    pub saturation: f64,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
}

/// Nearest-rank percentile over a sorted slice
fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((sorted.len() as f64) * p).floor() as usize;
    Some(sorted[idx.min(sorted.len() - 1)])
}

fn latency_percentiles(records: &[&RequestRecord]) -> (Option<f64>, Option<f64>) {
    let completed = records.iter().any(|r| r.status == Status::Completed);
    if !completed {
        // Undefined, not zero: avoids misleading downstream charts
        return (None, None);
    }
    // Pooled over completed and timed-out latencies across replications
    let mut latencies: Vec<f64> = records.iter().filter_map(|r| r.latency_ms()).collect();
    latencies.sort_unstable_by(f64::total_cmp);
    (percentile(&latencies, 0.95), percentile(&latencies, 0.99))
}

fn count_statuses(records: &[&RequestRecord]) -> (u64, u64, u64) {
    let mut completed = 0;
    let mut dropped = 0;
    let mut timed_out = 0;
    for r in records {
        match r.status {
            Status::Completed => completed += 1,
            Status::Dropped => dropped += 1,
            Status::Timeout => timed_out += 1,
        }
    }
    (completed, dropped, timed_out)
}

fn success_rate(completed: u64, dropped: u64, timed_out: u64) -> f64 {
    let total = completed + dropped + timed_out;
    if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64
    }
}

/// Whole-window golden signals for a finalized record collection.
///
/// Records arriving inside the warm-up window are excluded. Latency
/// percentiles are pooled across replications rather than averaged
/// per replication, to avoid small-sample percentile bias.
pub fn compute_group_metrics(records: &[RequestRecord], window: &RunWindow) -> GroupMetrics {
    let steady: Vec<&RequestRecord> = records
        .iter()
        .filter(|r| r.arrival_ms >= window.warmup_ms)
        .collect();

    let (completed, dropped, timed_out) = count_statuses(&steady);
    let reps = window.replications.max(1) as f64;
    let span_s = window.span_ms() / 1000.0;

    let throughput_rps = if span_s > 0.0 {
        completed as f64 / (span_s * reps)
    } else {
        0.0
    };

    let cpu_total_ms: f64 = steady.iter().map(|r| r.cpu_ms).sum();
    let worker_time_ms = window.worker_capacity as f64 * window.span_ms() * reps;
    let saturation = if worker_time_ms > 0.0 {
        cpu_total_ms / worker_time_ms
    } else {
        0.0
    };

    let (p95_latency_ms, p99_latency_ms) = latency_percentiles(&steady);

    GroupMetrics {
        completed,
        dropped,
        timed_out,
        throughput_rps,
        success_rate: success_rate(completed, dropped, timed_out),
        saturation,
        p95_latency_ms,
        p99_latency_ms,
    }
}

/// Time-binned golden signals for transient analysis.
///
/// Bins are keyed by departure time (finish timestamp; arrival for
/// dropped requests, which are finalized at the gate) and have fixed
/// width `bin_ms`. Only bins that received at least one record appear.
pub fn compute_time_metrics(
    records: &[RequestRecord],
    window: &RunWindow,
    bin_ms: f64,
) -> Vec<TimeBin> {
    // A non-positive width would collapse the bin key and divide the
    // rates by zero; reject it before touching any record.
    assert!(bin_ms > 0.0, "bin width must be positive (got {bin_ms} ms)");
    let mut bins: BTreeMap<i64, Vec<&RequestRecord>> = BTreeMap::new();
    for r in records {
        if r.arrival_ms < window.warmup_ms {
            continue;
        }
        let key = (r.departure_ms() / bin_ms).floor() as i64;
        bins.entry(key).or_default().push(r);
    }

    let reps = window.replications.max(1) as f64;
    let bin_s = bin_ms / 1000.0;
    let worker_time_ms = window.worker_capacity as f64 * bin_ms * reps;

    bins.into_iter()
        .map(|(key, rs)| {
            let (completed, dropped, timed_out) = count_statuses(&rs);
            let cpu_total_ms: f64 = rs.iter().map(|r| r.cpu_ms).sum();
            let (p95, p99) = latency_percentiles(&rs);
            TimeBin {
                time_ms: key as f64 * bin_ms,
                completed,
                dropped,
                timed_out,
                throughput_rps: completed as f64 / (bin_s * reps),
                success_rate: success_rate(completed, dropped, timed_out),
                saturation: cpu_total_ms / worker_time_ms,
                p95_latency_ms: p95,
                p99_latency_ms: p99,
            }
        })
        .collect()
}
