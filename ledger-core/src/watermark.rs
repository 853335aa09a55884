//! Commit sequence allocation and the sync watermark
//!
//! Sequences are handed out before a write batch is committed, so a later
//! sequence may become visible before an earlier one. The watermark is the
//! largest sequence `S` such that every sequence `<= S` has either committed
//! or been abandoned; readers never look past it, which makes
//! sequence-based incremental sync gap-free.

use parking_lot::Mutex;
use std::collections::BTreeSet;

#[derive(Debug)]
struct State {
    next: u64,
    in_flight: BTreeSet<u64>,
}

/// Allocates commit sequences and tracks which are still in flight
#[derive(Debug)]
pub struct CommitWatermark {
    state: Mutex<State>,
}

impl CommitWatermark {
    /// Resume after `last_committed` (0 for an empty ledger)
    pub fn new(last_committed: u64) -> Self {
        Self {
            state: Mutex::new(State {
                next: last_committed + 1,
                in_flight: BTreeSet::new(),
            }),
        }
    }

    /// Reserve the next sequence; must be followed by [`Self::release`]
    pub fn reserve(&self) -> u64 {
        let mut state = self.state.lock();
        let seq = state.next;
        state.next += 1;
        state.in_flight.insert(seq);
        seq
    }

    /// Mark a reserved sequence as committed or abandoned
    pub fn release(&self, seq: u64) {
        self.state.lock().in_flight.remove(&seq);
    }

    /// Highest sequence below which nothing is in flight
    pub fn current(&self) -> u64 {
        let state = self.state.lock();
        match state.in_flight.iter().next() {
            Some(lowest) => lowest - 1,
            None => state.next - 1,
        }
    }
}

/// Releases a reserved sequence on drop, including on error paths
pub(crate) struct Reservation<'a> {
    watermark: &'a CommitWatermark,
    seq: u64,
}

impl<'a> Reservation<'a> {
    pub(crate) fn new(watermark: &'a CommitWatermark) -> Self {
        let seq = watermark.reserve();
        Self { watermark, seq }
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.watermark.release(self.seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ledger() {
        let wm = CommitWatermark::new(0);
        assert_eq!(wm.current(), 0);
    }

    #[test]
    fn test_resume_after_restart() {
        let wm = CommitWatermark::new(41);
        assert_eq!(wm.current(), 41);
        assert_eq!(wm.reserve(), 42);
    }

    #[test]
    fn test_out_of_order_commit_holds_watermark() {
        let wm = CommitWatermark::new(0);
        let first = wm.reserve();
        let second = wm.reserve();

        // Later sequence finishes first: watermark must not pass `first`
        wm.release(second);
        assert_eq!(wm.current(), 0);

        wm.release(first);
        assert_eq!(wm.current(), 2);
    }

    #[test]
    fn test_reservation_released_on_drop() {
        let wm = CommitWatermark::new(0);
        {
            let reservation = Reservation::new(&wm);
            assert_eq!(reservation.seq(), 1);
            assert_eq!(wm.current(), 0);
        }
        assert_eq!(wm.current(), 1);
    }
}
