//! The processing network dispatch engine (§4.5).
//!
//! Grounded on the dispatch rules, kernel reply commands, backpressure and
//! failure semantics written out in full in the specification's Xentium
//! section — no corresponding `data_proc_net.c` exists in the original
//! source tree to ground the dispatch algorithm itself against, only the
//! headers (`data_proc_net.h`, `kernel/xentium_io.h`) defining the sentinel
//! op-codes, message shape and reply enum, and `data_proc_tracker.c`'s
//! plain FIFO for the per-op-code queue (see [`super::tracker`]).
//!
//! The DMA channel free list mirrors the teacher's singleton-registration
//! idiom used for the PLIC, swapped for a bounded SPSC-friendly queue since
//! channels are a fixed-size resource pool rather than a single instance.

use super::task::ProcessingTask;
use super::tracker::{Tracker, OP_NODE_IN, OP_NODE_OUT};
use crate::config::NOC_DMA_TRANSFER_QUEUE_SIZE;
use crate::sync::Mutex;
use crate::{KernelError, Result};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use crossbeam_queue::ArrayQueue;

/// `enum xen_cmd` from `include/kernel/xentium_io.h`: the reply a Xentium
/// posts to its mailbox once it finishes (or gives up on) a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XentiumReply {
    TaskSuccess,
    TaskStop,
    TaskDetach,
    TaskResched,
    TaskSortSeq,
    TaskDestroy,
    TaskNew,
    TaskDataRealloc,
    TaskExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XentiumState {
    Idle,
    Busy,
}

struct InFlight {
    task: ProcessingTask,
    dma_channel: u32,
    tracker_op_code: u32,
}

/// One Xentium DSP core instance bound to a single op-code.
struct XentiumInstance {
    id: u32,
    op_code: u32,
    state: XentiumState,
    in_flight: Option<InFlight>,
    /// Task retained by a `TaskDetach` reply: the Xentium owns it privately
    /// and the engine no longer tracks or re-dispatches it.
    detached: Option<ProcessingTask>,
}

/// Outcome of one dispatch round, for callers driving the engine's loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched { xentium_id: u32, tracker_op_code: u32, task_seq: u64 },
    /// No tracker holds a dispatchable task this round (everything empty,
    /// or every non-empty tracker is blocked on a busy/missing Xentium).
    NoWork,
}

/// The Xentium processing network: a directed graph of per-op-code
/// trackers plus the pool of Xentium instances and DMA channels that serve
/// them.
pub struct ProcessingNetwork {
    trackers: Mutex<BTreeMap<u32, Tracker>>,
    xentiums: Mutex<Vec<XentiumInstance>>,
    dma_free: ArrayQueue<u32>,
    output: Mutex<alloc::collections::VecDeque<ProcessingTask>>,
    next_stream_order: core::sync::atomic::AtomicUsize,
}

impl ProcessingNetwork {
    pub fn new() -> Self {
        let dma_free = ArrayQueue::new(NOC_DMA_TRANSFER_QUEUE_SIZE);
        for ch in 0..NOC_DMA_TRANSFER_QUEUE_SIZE as u32 {
            let _ = dma_free.push(ch);
        }
        let mut trackers = BTreeMap::new();
        trackers.insert(OP_NODE_IN, Tracker::new(OP_NODE_IN, 0, usize::MAX));
        trackers.insert(OP_NODE_OUT, Tracker::new(OP_NODE_OUT, 0, usize::MAX));
        Self {
            trackers: Mutex::new(trackers),
            xentiums: Mutex::new(Vec::new()),
            dma_free,
            output: Mutex::new(alloc::collections::VecDeque::new()),
            next_stream_order: core::sync::atomic::AtomicUsize::new(1),
        }
    }

    /// Registers an internal processing node for `op_code` with the given
    /// backpressure threshold. The `IN`/`OUT` sentinel nodes already exist
    /// and do not need (and cannot take) a registration.
    pub fn add_node(&self, op_code: u32, critical_threshold: usize) {
        debug_assert!(op_code != OP_NODE_IN && op_code != OP_NODE_OUT);
        let order = self.next_stream_order.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
        self.trackers.lock().entry(op_code).or_insert_with(|| Tracker::new(op_code, order, critical_threshold));
    }

    /// Attaches a Xentium DSP core instance able to serve `op_code`.
    pub fn register_xentium(&self, id: u32, op_code: u32) {
        self.xentiums.lock().push(XentiumInstance { id, op_code, state: XentiumState::Idle, in_flight: None, detached: None });
    }

    /// Hands a freshly-created task to the network, routing it to the
    /// tracker for its first pending op-code. Honors backpressure: refused
    /// if that tracker is at or above its critical threshold.
    pub fn input_task(&self, task: ProcessingTask) -> Result<()> {
        let op_code = task.pending_op_code().unwrap_or(OP_NODE_OUT);
        self.route_task(task, op_code)
    }

    fn route_task(&self, task: ProcessingTask, op_code: u32) -> Result<()> {
        if op_code == OP_NODE_OUT || task.is_route_complete() {
            self.output.lock().push_back(task);
            return Ok(());
        }
        let mut trackers = self.trackers.lock();
        let tracker = trackers.get_mut(&op_code).ok_or(KernelError::NoDevice)?;
        if tracker.is_critical() {
            return Err(KernelError::DeviceBusy);
        }
        tracker.put(task);
        Ok(())
    }

    pub fn take_output(&self) -> Option<ProcessingTask> {
        self.output.lock().pop_front()
    }

    /// Runs one dispatch round: scans non-sentinel trackers by descending
    /// fill ratio (ties broken by earliest stream order), and dispatches
    /// the first one for which a DMA channel and a matching idle Xentium
    /// are both available. Guarantees progress on at least one
    /// non-critical tracker per round as long as one can be served.
    pub fn dispatch_once(&self) -> DispatchOutcome {
        let mut trackers = self.trackers.lock();
        let mut candidates: Vec<u32> = trackers
            .iter()
            .filter(|(&op, t)| op != OP_NODE_IN && op != OP_NODE_OUT && !t.is_disabled() && !t.is_empty())
            .map(|(&op, _)| op)
            .collect();
        candidates.sort_by(|&a, &b| {
            let ta = trackers.get(&a).unwrap();
            let tb = trackers.get(&b).unwrap();
            tb.fill_ratio()
                .partial_cmp(&ta.fill_ratio())
                .unwrap_or(core::cmp::Ordering::Equal)
                .then(ta.stream_order.cmp(&tb.stream_order))
        });

        for op_code in candidates {
            let Some(channel) = self.dma_free.pop() else { continue };
            let mut xentiums = self.xentiums.lock();
            let Some(x) = xentiums.iter_mut().find(|x| x.op_code == op_code && x.state == XentiumState::Idle) else {
                let _ = self.dma_free.push(channel);
                continue;
            };
            let tracker = trackers.get_mut(&op_code).unwrap();
            let Some(task) = tracker.get() else { continue };
            let task_seq = task.seq;
            let xentium_id = x.id;
            x.state = XentiumState::Busy;
            x.in_flight = Some(InFlight { task, dma_channel: channel, tracker_op_code: op_code });
            return DispatchOutcome::Dispatched { xentium_id, tracker_op_code: op_code, task_seq };
        }
        DispatchOutcome::NoWork
    }

    /// Processes a Xentium's reply to the task it was handed, per the
    /// kernel reply command semantics.
    pub fn complete(&self, xentium_id: u32, reply: XentiumReply) -> Result<()> {
        let mut xentiums = self.xentiums.lock();
        let idx = xentiums.iter().position(|x| x.id == xentium_id).ok_or(KernelError::NoDevice)?;

        if reply == XentiumReply::TaskExit {
            xentiums.remove(idx);
            return Ok(());
        }

        let x = &mut xentiums[idx];
        let InFlight { mut task, dma_channel, tracker_op_code } = x.in_flight.take().ok_or(KernelError::InvalidArgument)?;
        x.state = XentiumState::Idle;
        let _ = self.dma_free.push(dma_channel);

        match reply {
            XentiumReply::TaskSuccess => {
                task.advance();
                let next_op = task.pending_op_code().unwrap_or(OP_NODE_OUT);
                drop(xentiums);
                self.route_task(task, next_op)?;
            }
            XentiumReply::TaskStop => {
                task.advance();
                let next_op = task.pending_op_code().unwrap_or(OP_NODE_OUT);
                drop(xentiums);
                if let Some(t) = self.trackers.lock().get_mut(&tracker_op_code) {
                    t.disable();
                }
                self.route_task(task, next_op)?;
            }
            XentiumReply::TaskDetach => {
                x.detached = Some(task);
            }
            XentiumReply::TaskResched => {
                drop(xentiums);
                self.requeue(task, tracker_op_code);
            }
            XentiumReply::TaskSortSeq => {
                drop(xentiums);
                self.requeue(task, tracker_op_code);
                if let Some(t) = self.trackers.lock().get_mut(&tracker_op_code) {
                    t.sort_by_seq();
                }
            }
            XentiumReply::TaskDestroy => {
                // Task dropped; nothing further to route.
            }
            XentiumReply::TaskNew | XentiumReply::TaskDataRealloc => {
                drop(xentiums);
                self.requeue(task, tracker_op_code);
            }
            XentiumReply::TaskExit => unreachable!("handled above"),
        }
        Ok(())
    }

    fn requeue(&self, task: ProcessingTask, tracker_op_code: u32) {
        if let Some(t) = self.trackers.lock().get_mut(&tracker_op_code) {
            t.push_front(task);
        }
    }

    /// Failure path for a Xentium whose mailbox has gone silent past its
    /// configured timeout: the instance is dropped from the pool and its
    /// in-flight task, if any, is discarded (routed to `DESTROY`).
    pub fn reset_hung(&self, xentium_id: u32) {
        let mut xentiums = self.xentiums.lock();
        if let Some(idx) = xentiums.iter().position(|x| x.id == xentium_id) {
            if let Some(in_flight) = xentiums[idx].in_flight.take() {
                let _ = self.dma_free.push(in_flight.dma_channel);
            }
            xentiums.remove(idx);
        }
    }

    /// A DMA error on `channel` surfaces as a per-task `DESTROY`: the
    /// channel is released, the owning Xentium's in-flight task dropped,
    /// and the Xentium itself returned to idle (unlike a hang, it is not
    /// removed from the pool).
    pub fn release_dma_error(&self, xentium_id: u32) {
        let mut xentiums = self.xentiums.lock();
        if let Some(x) = xentiums.iter_mut().find(|x| x.id == xentium_id) {
            if let Some(in_flight) = x.in_flight.take() {
                let _ = self.dma_free.push(in_flight.dma_channel);
            }
            x.state = XentiumState::Idle;
        }
    }
}

impl Default for ProcessingNetwork {
    fn default() -> Self {
        Self::new()
    }
}
