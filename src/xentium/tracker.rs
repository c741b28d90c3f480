//! Per-op-code task trackers (§4.5).
//!
//! Grounded on `original_source/lib/data_proc_tracker.c`'s `struct
//! proc_tracker`: a FIFO of tasks waiting on one processing op-code, plus
//! the `n` counter the original keeps alongside the list so
//! `pt_track_get_usage` doesn't have to walk it.

use super::task::ProcessingTask;
use alloc::collections::VecDeque;

/// Sentinel op-codes bracketing the network, from `data_proc_net.h`.
pub const OP_NODE_IN: u32 = 0xFFFF_FFFF;
pub const OP_NODE_OUT: u32 = 0x0000_0000;

/// A FIFO queue of tasks waiting on a single op-code, with the backpressure
/// threshold from §4.5's dispatch rules attached.
pub struct Tracker {
    pub op_code: u32,
    /// Position this op-code first appeared in the input stream; used to
    /// break fill-ratio ties in the dispatch sweep.
    pub stream_order: usize,
    pub critical_threshold: usize,
    queue: VecDeque<ProcessingTask>,
    /// Set on a `STOP` reply; a disabled tracker is skipped by dispatch but
    /// still accepts enqueues (it may be re-enabled later).
    disabled: bool,
}

impl Tracker {
    pub fn new(op_code: u32, stream_order: usize, critical_threshold: usize) -> Self {
        Self { op_code, stream_order, critical_threshold, queue: VecDeque::new(), disabled: false }
    }

    /// `pt_track_get_usage`.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// `queue_len / critical_threshold`, the fill ratio dispatch ranks on.
    pub fn fill_ratio(&self) -> f64 {
        if self.critical_threshold == 0 {
            return 0.0;
        }
        self.queue.len() as f64 / self.critical_threshold as f64
    }

    pub fn is_critical(&self) -> bool {
        self.queue.len() >= self.critical_threshold
    }

    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn enable(&mut self) {
        self.disabled = false;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// `pt_track_put`.
    pub fn put(&mut self, task: ProcessingTask) {
        self.queue.push_back(task);
    }

    /// `pt_track_get`: pops the task with the smallest sequence number. The
    /// queue is kept in roughly-FIFO order and only reordered on an
    /// explicit `SORTSEQ` reply, so this is ordinarily just `pop_front`.
    pub fn get(&mut self) -> Option<ProcessingTask> {
        self.queue.pop_front()
    }

    /// `pt_track_sort_seq`: reorders the queue by ascending sequence number.
    pub fn sort_by_seq(&mut self) {
        let mut items: alloc::vec::Vec<_> = self.queue.drain(..).collect();
        items.sort_by_key(|t| t.seq);
        self.queue = items.into();
    }

    pub fn push_front(&mut self, task: ProcessingTask) {
        self.queue.push_front(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(seq: u64) -> ProcessingTask {
        ProcessingTask::new(0, 1, 1, [1], 0, seq)
    }

    #[test]
    fn fill_ratio_tracks_queue_depth_against_threshold() {
        let mut t = Tracker::new(1, 0, 4);
        assert_eq!(t.fill_ratio(), 0.0);
        t.put(task(0));
        t.put(task(1));
        assert_eq!(t.fill_ratio(), 0.5);
        assert!(!t.is_critical());
        t.put(task(2));
        t.put(task(3));
        assert!(t.is_critical());
    }

    #[test]
    fn get_is_fifo_by_default() {
        let mut t = Tracker::new(1, 0, 10);
        t.put(task(5));
        t.put(task(1));
        assert_eq!(t.get().unwrap().seq, 5);
        assert_eq!(t.get().unwrap().seq, 1);
    }

    #[test]
    fn sort_by_seq_reorders_queue() {
        let mut t = Tracker::new(1, 0, 10);
        t.put(task(5));
        t.put(task(1));
        t.put(task(3));
        t.sort_by_seq();
        assert_eq!(t.get().unwrap().seq, 1);
        assert_eq!(t.get().unwrap().seq, 3);
        assert_eq!(t.get().unwrap().seq, 5);
    }

    #[test]
    fn disable_does_not_block_enqueue() {
        let mut t = Tracker::new(1, 0, 10);
        t.disable();
        t.put(task(0));
        assert!(t.is_disabled());
        assert_eq!(t.len(), 1);
    }
}
