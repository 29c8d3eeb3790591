//! Capacity-limited FIFO resource pool.
//!
//! Models worker threads and the I/O concurrency limit. Contention is
//! expressed entirely through the wait list; the simulation is
//! single-threaded, so no locking is involved.

use std::collections::VecDeque;

/// Identifier of a request lifecycle process.
pub type ProcId = u64;

/// A capacity-limited mutual-exclusion primitive with a FIFO wait list.
pub struct ResourcePool {
    capacity: usize,
    held: usize,
    waiting: VecDeque<ProcId>,
}

impl ResourcePool {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be positive");
        Self {
            capacity,
            held: 0,
            waiting: VecDeque::new(),
        }
    }

    /// Grant a slot immediately if one is free, otherwise append `proc`
    /// to the wait list. Returns whether the grant happened now.
    pub fn try_acquire(&mut self, proc: ProcId) -> bool {
        if self.held < self.capacity {
            self.held += 1;
            true
        } else {
            self.waiting.push_back(proc);
            false
        }
    }

    /// Release one slot. If anyone is waiting, the slot transfers to the
    /// head of the wait list within the same instant and the grantee is
    /// returned; the caller must resume it.
    pub fn release(&mut self) -> Option<ProcId> {
        debug_assert!(self.held > 0, "release without a held slot");
        self.held -= 1;
        let next = self.waiting.pop_front()?;
        self.held += 1;
        Some(next)
    }

    /// Withdraw a not-yet-granted waiter, e.g. on timeout cancellation.
    /// `held` is untouched: the waiter never owned a slot.
    pub fn cancel_wait(&mut self, proc: ProcId) {
        self.waiting.retain(|&p| p != proc);
    }

    pub fn held(&self) -> usize {
        self.held
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Requests currently queued for a slot.
    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grants_up_to_capacity() {
        let mut pool = ResourcePool::new(2);
        assert!(pool.try_acquire(1));
        assert!(pool.try_acquire(2));
        assert!(!pool.try_acquire(3));
        assert_eq!(pool.held(), 2);
        assert_eq!(pool.waiting_len(), 1);
    }

    #[test]
    fn test_fifo_grant_order() {
        let mut pool = ResourcePool::new(1);
        assert!(pool.try_acquire(10));
        assert!(!pool.try_acquire(11));
        assert!(!pool.try_acquire(12));
        assert!(!pool.try_acquire(13));

        // Releases grant to waiters strictly in acquire order
        assert_eq!(pool.release(), Some(11));
        assert_eq!(pool.release(), Some(12));
        assert_eq!(pool.release(), Some(13));
        assert_eq!(pool.held(), 1);
        assert_eq!(pool.release(), None);
        assert_eq!(pool.held(), 0);
    }

    #[test]
    fn test_release_transfers_without_idle_slot() {
        let mut pool = ResourcePool::new(1);
        assert!(pool.try_acquire(1));
        assert!(!pool.try_acquire(2));
        // held never dips to zero across the transfer
        assert_eq!(pool.release(), Some(2));
        assert_eq!(pool.held(), 1);
    }

    #[test]
    fn test_cancel_wait_skips_cancelled_waiter() {
        let mut pool = ResourcePool::new(1);
        assert!(pool.try_acquire(1));
        assert!(!pool.try_acquire(2));
        assert!(!pool.try_acquire(3));

        pool.cancel_wait(2);
        assert_eq!(pool.waiting_len(), 1);
        assert_eq!(pool.held(), 1);
        assert_eq!(pool.release(), Some(3));
    }
}
