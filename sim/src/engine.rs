//! Request lifecycle engine.
//!
//! Drives each admitted request through its CPU and I/O phases as an
//! explicit state machine over the virtual clock, arbitrating the worker
//! and I/O pools and racing every request against its timeout timer.
//! Execution is single-threaded and cooperative: all contention lives in
//! the pools, never in locks.

use crate::clock::SimClock;
use crate::pool::{ProcId, ResourcePool};
use crate::samplers::{ArrivalPattern, ServiceSampler};
use crate::{ConfigError, SimConfig};
use metrics::{Mode, RequestRecord, RunCounters, Status};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Event {
    Arrival,
    PhaseDone(ProcId),
    Timeout(ProcId),
}

/// Lifecycle states of one admitted request.
///
/// Sync path:  AcquireWorker → CpuPre → AcquireIo → IoWait → CpuPost
/// (the worker stays held across AcquireIo and IoWait — the defining
/// cost of blocking I/O).
/// Async path: AcquireWorker → CpuPre → [worker released] → AcquireIo →
/// IoWait → ReacquireWorker → CpuPost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the initial worker grant; counted in the backlog
    AcquireWorker,
    CpuPre,
    AcquireIo,
    IoWait,
    /// Async only: queueing behind other ready work after I/O
    ReacquireWorker,
    CpuPost,
}

/// Sampled demand of one request
#[derive(Debug, Clone, Copy)]
struct Demand {
    cpu_pre_ms: f64,
    cpu_post_ms: f64,
    io_ms: f64,
}

struct Proc {
    demand: Demand,
    arrival_ms: f64,
    start_ms: Option<f64>,
    /// CPU time executed so far while holding a worker
    cpu_ms: f64,
    phase: Phase,
    phase_started_ms: f64,
    holds_worker: bool,
    holds_io: bool,
}

/// One simulation run: clock, pools, live processes and the record
/// stream. Nothing is shared across runs.
pub(crate) struct Engine {
    clock: SimClock<Event>,
    worker: ResourcePool,
    io: ResourcePool,
    rng: SmallRng,
    mode: Mode,
    cpu: ServiceSampler,
    io_time: ServiceSampler,
    arrival: ArrivalPattern,
    rate_rps: f64,
    timeout_ms: f64,
    queue_limit: usize,
    sim_time_ms: f64,
    /// Requests waiting for their initial worker grant
    backlog: usize,
    procs: HashMap<ProcId, Proc>,
    records: Vec<RequestRecord>,
    counters: RunCounters,
    next_id: u64,
}

impl Engine {
    pub(crate) fn new(cfg: &SimConfig) -> Result<Self, ConfigError> {
        let mut engine = Self {
            clock: SimClock::new(),
            worker: ResourcePool::new(cfg.worker_capacity()),
            io: ResourcePool::new(cfg.io_limit),
            rng: SmallRng::seed_from_u64(cfg.seed),
            mode: cfg.mode,
            cpu: cfg.cpu.sampler()?,
            io_time: cfg.io.sampler()?,
            arrival: cfg.arrival,
            rate_rps: cfg.rate_rps,
            timeout_ms: cfg.timeout_ms,
            queue_limit: cfg.queue_limit,
            sim_time_ms: cfg.sim_time_ms,
            backlog: 0,
            procs: HashMap::new(),
            records: Vec::new(),
            counters: RunCounters::default(),
            next_id: 0,
        };
        engine.schedule_next_arrival();
        Ok(engine)
    }

    /// Fire events until the measurement window ends. Requests still in
    /// flight at the cutoff produce no record.
    pub(crate) fn run(mut self) -> (Vec<RequestRecord>, RunCounters) {
        while let Some(event) = self.clock.pop_before(self.sim_time_ms) {
            self.dispatch(event);
        }
        (self.records, self.counters)
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Arrival => self.on_arrival(),
            Event::PhaseDone(id) => self.on_phase_done(id),
            Event::Timeout(id) => self.on_timeout(id),
        }
    }

    // ----------------------------
    // Arrival / admission gate
    // ----------------------------

    fn schedule_next_arrival(&mut self) {
        let gap = self.arrival.next_gap_ms(self.rate_rps, &mut self.rng);
        // Arrivals beyond the horizon can never fire; not scheduling
        // them lets the event queue drain.
        if self.clock.now_ms() + gap < self.sim_time_ms {
            self.clock.schedule(gap, Event::Arrival);
        }
    }

    fn on_arrival(&mut self) {
        self.counters.arrivals += 1;
        if self.gate_full() {
            self.drop_arrival();
        } else {
            // Demand is sampled only for admitted requests
            let total_cpu = self.cpu.draw(&mut self.rng);
            let split: f64 = self.rng.gen();
            let io_ms = self.io_time.draw(&mut self.rng);
            self.admit(Demand {
                cpu_pre_ms: total_cpu * split,
                cpu_post_ms: total_cpu * (1.0 - split),
                io_ms,
            });
        }
        self.schedule_next_arrival();
    }

    /// Admission gate: drop when no worker slot is free and the backlog
    /// has reached `queue_limit`.
    fn gate_full(&self) -> bool {
        self.worker.held() == self.worker.capacity() && self.backlog >= self.queue_limit
    }

    fn drop_arrival(&mut self) {
        let id = self.next_id;
        self.next_id += 1;
        self.counters.dropped += 1;
        // Never entered service: no service timestamps
        self.records.push(RequestRecord {
            id,
            mode: self.mode,
            status: Status::Dropped,
            arrival_ms: self.clock.now_ms(),
            start_ms: None,
            finish_ms: None,
            cpu_ms: 0.0,
        });
    }

    fn admit(&mut self, demand: Demand) -> ProcId {
        let id = self.next_id;
        self.next_id += 1;
        let now = self.clock.now_ms();
        self.backlog += 1;
        self.procs.insert(
            id,
            Proc {
                demand,
                arrival_ms: now,
                start_ms: None,
                cpu_ms: 0.0,
                phase: Phase::AcquireWorker,
                phase_started_ms: now,
                holds_worker: false,
                holds_io: false,
            },
        );
        // The timer races the full service path from admission, so
        // backlog wait counts against the budget. Zero disables it.
        if self.timeout_ms > 0.0 {
            self.clock.schedule(self.timeout_ms, Event::Timeout(id));
        }
        if self.worker.try_acquire(id) {
            self.on_worker_grant(id);
        }
        id
    }

    // ----------------------------
    // Phase transitions
    // ----------------------------

    fn on_worker_grant(&mut self, id: ProcId) {
        let now = self.clock.now_ms();
        let Some(proc) = self.procs.get_mut(&id) else {
            debug_assert!(false, "worker granted to a finalized request");
            return;
        };
        let delay = match proc.phase {
            Phase::AcquireWorker => {
                self.backlog -= 1;
                proc.holds_worker = true;
                proc.start_ms = Some(now);
                proc.phase = Phase::CpuPre;
                proc.phase_started_ms = now;
                proc.demand.cpu_pre_ms
            }
            Phase::ReacquireWorker => {
                proc.holds_worker = true;
                proc.phase = Phase::CpuPost;
                proc.phase_started_ms = now;
                proc.demand.cpu_post_ms
            }
            _ => {
                debug_assert!(false, "worker grant in phase {:?}", proc.phase);
                return;
            }
        };
        self.clock.schedule(delay, Event::PhaseDone(id));
    }

    fn on_io_grant(&mut self, id: ProcId) {
        let now = self.clock.now_ms();
        let Some(proc) = self.procs.get_mut(&id) else {
            debug_assert!(false, "I/O slot granted to a finalized request");
            return;
        };
        debug_assert_eq!(proc.phase, Phase::AcquireIo);
        proc.holds_io = true;
        proc.phase = Phase::IoWait;
        proc.phase_started_ms = now;
        let delay = proc.demand.io_ms;
        self.clock.schedule(delay, Event::PhaseDone(id));
    }

    fn on_phase_done(&mut self, id: ProcId) {
        let now = self.clock.now_ms();
        let Some(proc) = self.procs.get_mut(&id) else {
            // The timeout won the race; this timer is stale
            return;
        };
        match proc.phase {
            Phase::CpuPre => {
                proc.cpu_ms += proc.demand.cpu_pre_ms;
                proc.phase = Phase::AcquireIo;
                if self.mode == Mode::Async {
                    // Event loop frees the worker across I/O
                    proc.holds_worker = false;
                    self.release_worker();
                }
                if self.io.try_acquire(id) {
                    self.on_io_grant(id);
                }
            }
            Phase::IoWait => {
                proc.holds_io = false;
                match self.mode {
                    Mode::Sync => {
                        // Worker was held through the I/O; go straight
                        // to the post-I/O CPU burst
                        proc.phase = Phase::CpuPost;
                        proc.phase_started_ms = now;
                        let delay = proc.demand.cpu_post_ms;
                        self.release_io();
                        self.clock.schedule(delay, Event::PhaseDone(id));
                    }
                    Mode::Async => {
                        proc.phase = Phase::ReacquireWorker;
                        self.release_io();
                        if self.worker.try_acquire(id) {
                            self.on_worker_grant(id);
                        }
                    }
                }
            }
            Phase::CpuPost => {
                proc.cpu_ms += proc.demand.cpu_post_ms;
                proc.holds_worker = false;
                self.release_worker();
                self.finalize(id, Status::Completed);
            }
            Phase::AcquireWorker | Phase::AcquireIo | Phase::ReacquireWorker => {
                debug_assert!(false, "phase timer fired while awaiting a grant");
            }
        }
    }

    // ----------------------------
    // Timeout cancellation
    // ----------------------------

    /// Cancel the request at its current suspension point: withdraw any
    /// pending acquisition, account partially executed CPU, and release
    /// every held slot within the same instant so a concurrently
    /// finishing process never observes an overcommitted pool.
    fn on_timeout(&mut self, id: ProcId) {
        let now = self.clock.now_ms();
        let Some(proc) = self.procs.get_mut(&id) else {
            // Completed before the timer fired; the race is settled
            return;
        };
        if matches!(proc.phase, Phase::CpuPre | Phase::CpuPost) {
            proc.cpu_ms += now - proc.phase_started_ms;
        }
        let phase = proc.phase;
        let holds_worker = proc.holds_worker;
        let holds_io = proc.holds_io;
        match phase {
            Phase::AcquireWorker => {
                self.worker.cancel_wait(id);
                self.backlog -= 1;
            }
            Phase::ReacquireWorker => self.worker.cancel_wait(id),
            Phase::AcquireIo => self.io.cancel_wait(id),
            Phase::CpuPre | Phase::IoWait | Phase::CpuPost => {}
        }
        if holds_io {
            self.release_io();
        }
        if holds_worker {
            self.release_worker();
        }
        self.finalize(id, Status::Timeout);
    }

    // ----------------------------
    // Pool release with synchronous hand-off
    // ----------------------------

    fn release_worker(&mut self) {
        if let Some(next) = self.worker.release() {
            self.on_worker_grant(next);
        }
    }

    fn release_io(&mut self) {
        if let Some(next) = self.io.release() {
            self.on_io_grant(next);
        }
    }

    /// Freeze and emit the record; exactly one terminal status per
    /// request, enforced by removal from the live map.
    fn finalize(&mut self, id: ProcId, status: Status) {
        let Some(proc) = self.procs.remove(&id) else {
            return;
        };
        match status {
            Status::Completed => self.counters.completed += 1,
            Status::Timeout => self.counters.timed_out += 1,
            Status::Dropped => unreachable!("drops are finalized at the gate"),
        }
        self.records.push(RequestRecord {
            id,
            mode: self.mode,
            status,
            arrival_ms: proc.arrival_ms,
            start_ms: proc.start_ms,
            finish_ms: Some(self.clock.now_ms()),
            cpu_ms: proc.cpu_ms,
        });
    }
}
