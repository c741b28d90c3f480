//! Processing tasks and their op-code route (§4.5).
//!
//! Grounded on `original_source/include/data_proc_task.h`'s `struct
//! proc_task`/`struct proc_step`: a task carries a `todo`/`done` pair of
//! step lists instead of one mutable cursor, so a task's history survives
//! as it crosses trackers. The intrusive `list_head` pending/done lists
//! become plain [`alloc::collections::VecDeque`]/[`alloc::vec::Vec`].

use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// One op-code hop in a task's route. `op_info` stands in for the
/// original's arbitrary `void *op_info` — this engine is bookkeeping-only,
/// so it carries an opaque tag rather than a live pointer.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingStep {
    pub op_code: u32,
    pub op_info: u64,
}

/// A unit of work flowing through the processing network.
#[derive(Debug, Clone)]
pub struct ProcessingTask {
    /// Bookkeeping-only data handle, analogous to `proc_task::data`.
    pub data_ptr: u64,
    pub size: usize,
    pub nmemb: usize,
    todo: VecDeque<ProcessingStep>,
    done: Vec<ProcessingStep>,
    pub task_type: u32,
    pub seq: u64,
}

impl ProcessingTask {
    pub fn new(data_ptr: u64, size: usize, nmemb: usize, route: impl IntoIterator<Item = u32>, task_type: u32, seq: u64) -> Self {
        let todo = route.into_iter().map(|op_code| ProcessingStep { op_code, op_info: 0 }).collect();
        Self { data_ptr, size, nmemb, todo, done: Vec::new(), task_type, seq }
    }

    /// The op-code of the step this task is currently waiting on, if any.
    pub fn pending_op_code(&self) -> Option<u32> {
        self.todo.front().map(|s| s.op_code)
    }

    pub fn pending_op_info(&self) -> Option<u64> {
        self.todo.front().map(|s| s.op_info)
    }

    /// Completes the current pending step, moving it onto `done`.
    pub fn advance(&mut self) -> Option<ProcessingStep> {
        let step = self.todo.pop_front()?;
        self.done.push(step);
        Some(step)
    }

    pub fn is_route_complete(&self) -> bool {
        self.todo.is_empty()
    }

    pub fn add_step(&mut self, op_code: u32, op_info: u64) {
        self.todo.push_back(ProcessingStep { op_code, op_info });
    }

    /// `pt_rewind_steps_done`: moves every completed step back onto the
    /// front of the pending list, in original order.
    pub fn rewind_steps_done(&mut self) {
        while let Some(step) = self.done.pop() {
            self.todo.push_front(step);
        }
    }

    /// `pt_del_last_step_done`.
    pub fn del_last_step_done(&mut self) -> Option<ProcessingStep> {
        self.done.pop()
    }

    pub fn steps_done(&self) -> &[ProcessingStep] {
        &self.done
    }
}
