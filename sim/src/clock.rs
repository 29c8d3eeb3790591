//! Virtual clock and event scheduler.
//!
//! Time advances only when events fire, so runs are deterministic and
//! independent of host speed. Events at equal times fire in insertion
//! order, which makes replay exact for a fixed seed.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

struct Entry<E> {
    time_ms: f64,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time_ms
            .total_cmp(&other.time_ms)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Virtual simulation clock with a pending-event queue.
pub struct SimClock<E> {
    now_ms: f64,
    seq: u64,
    queue: BinaryHeap<Reverse<Entry<E>>>,
}

impl<E> SimClock<E> {
    pub fn new() -> Self {
        Self {
            now_ms: 0.0,
            seq: 0,
            queue: BinaryHeap::new(),
        }
    }

    /// Current virtual time in milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    /// Enqueue `event` to fire at `now + delay_ms`.
    pub fn schedule(&mut self, delay_ms: f64, event: E) {
        debug_assert!(delay_ms >= 0.0, "negative delay: {delay_ms}");
        let entry = Entry {
            time_ms: self.now_ms + delay_ms,
            seq: self.seq,
            event,
        };
        self.seq += 1;
        self.queue.push(Reverse(entry));
    }

    /// Pop and fire the earliest event strictly before `deadline_ms`,
    /// advancing the clock to its time. Returns `None` once the queue is
    /// empty or the next event lies at or beyond the deadline; in the
    /// latter case the clock advances to the deadline.
    pub fn pop_before(&mut self, deadline_ms: f64) -> Option<E> {
        match self.queue.peek() {
            Some(Reverse(entry)) if entry.time_ms < deadline_ms => {
                let Reverse(entry) = self.queue.pop()?;
                self.now_ms = entry.time_ms;
                Some(entry.event)
            }
            Some(_) => {
                self.now_ms = deadline_ms;
                None
            }
            None => None,
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl<E> Default for SimClock<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_time_order() {
        let mut clock: SimClock<u32> = SimClock::new();
        clock.schedule(30.0, 3);
        clock.schedule(10.0, 1);
        clock.schedule(20.0, 2);

        assert_eq!(clock.pop_before(f64::INFINITY), Some(1));
        assert_eq!(clock.now_ms(), 10.0);
        assert_eq!(clock.pop_before(f64::INFINITY), Some(2));
        assert_eq!(clock.pop_before(f64::INFINITY), Some(3));
        assert_eq!(clock.now_ms(), 30.0);
        assert_eq!(clock.pop_before(f64::INFINITY), None);
    }

    #[test]
    fn test_ties_fire_in_insertion_order() {
        let mut clock: SimClock<u32> = SimClock::new();
        clock.schedule(5.0, 1);
        clock.schedule(5.0, 2);
        clock.schedule(5.0, 3);

        assert_eq!(clock.pop_before(f64::INFINITY), Some(1));
        assert_eq!(clock.pop_before(f64::INFINITY), Some(2));
        assert_eq!(clock.pop_before(f64::INFINITY), Some(3));
    }

    #[test]
    fn test_deadline_stops_and_advances_clock() {
        let mut clock: SimClock<u32> = SimClock::new();
        clock.schedule(10.0, 1);
        clock.schedule(50.0, 2);

        assert_eq!(clock.pop_before(20.0), Some(1));
        assert_eq!(clock.pop_before(20.0), None);
        assert_eq!(clock.now_ms(), 20.0);
        assert_eq!(clock.pending(), 1);
    }

    #[test]
    fn test_relative_delay_from_current_time() {
        let mut clock: SimClock<u32> = SimClock::new();
        clock.schedule(10.0, 1);
        assert_eq!(clock.pop_before(f64::INFINITY), Some(1));
        clock.schedule(5.0, 2);
        assert_eq!(clock.pop_before(f64::INFINITY), Some(2));
        assert_eq!(clock.now_ms(), 15.0);
    }
}
