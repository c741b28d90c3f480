//! Xentium DSP processing-network engine (§4.5).
//!
//! A directed graph of per-op-code trackers feeding tasks to Xentium DSP
//! cores, bracketed by `IN`/`OUT` sentinel nodes. Grounded on
//! `original_source/include/data_proc_task.h`, `data_proc_net.h`,
//! `lib/data_proc_tracker.c` and `include/kernel/xentium_io.h`; see
//! [`engine`]'s module doc for the dispatch-algorithm grounding gap.

pub mod engine;
pub mod task;
pub mod tracker;

pub use engine::{DispatchOutcome, ProcessingNetwork, XentiumReply};
pub use task::{ProcessingStep, ProcessingTask};
pub use tracker::{Tracker, OP_NODE_IN, OP_NODE_OUT};
