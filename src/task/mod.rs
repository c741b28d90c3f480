//! Task control blocks and the task arena (§4.3, Design Notes §9).
//!
//! Grounded on `original_source/include/kernel/kthread.h`'s `task_struct`:
//! this module keeps the same fields (state, stack bounds, scheduling
//! attributes, accounting counters, parent/children) but replaces the
//! intrusive `list_head` relationships with a stable [`TaskId`] and an arena
//! (`TaskList`), the way [`crate::task`]'s grounding kernel keeps tasks in a
//! `BTreeMap<Tid, Arc<SpinMutex<Task>>>` rather than raw pointers.

use crate::sched::SchedAttr;
use crate::sync::{Mutex, RwLock};
use crate::Ktime;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Stable identifier for a task, unique for the lifetime of the kernel
/// (never reused), used in place of the original's intrusive pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(NonZeroUsize);

impl TaskId {
    pub fn get(self) -> usize {
        self.0.get()
    }
}

/// `TASK_RUN` / `TASK_IDLE` / `TASK_NEW` / `TASK_DEAD` / `TASK_BUSY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    New,
    Run,
    Idle,
    Busy,
    Dead,
}

/// Sentinel meaning "no CPU affinity", `KTHREAD_CPU_AFFINITY_NONE`.
pub const CPU_AFFINITY_NONE: i32 = -1;

/// The function a spawned task begins executing at, taking the opaque word
/// handed to [`crate::kernel::Kernel::create`] as `entry_arg`. `None` on the
/// bootstrap/main task registered by `init_main`, which is already running.
pub type TaskEntry = fn(usize);

bitflags::bitflags! {
    /// `TASK_RUN_ONCE` / `TASK_NO_CLEAN` / `TASK_NO_CHECK`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u32 {
        const RUN_ONCE  = 1 << 0;
        const NO_CLEAN  = 1 << 30;
        const NO_CHECK  = 1 << 31;
    }
}

/// A kernel task control block.
pub struct Task {
    pub name: String,
    pub state: TaskState,
    pub on_cpu: i32,
    pub attr: SchedAttr,
    pub flags: TaskFlags,

    /// Remaining runtime in the current period/timeslice.
    pub runtime: Ktime,
    /// Start of the next period.
    pub wakeup: Ktime,
    /// Deadline of the current period.
    pub deadline: Ktime,

    pub exec_start: Ktime,
    pub total: Ktime,
    pub slices: u64,

    pub parent: Option<TaskId>,
    pub children: Vec<TaskId>,

    /// Entry point a spawned task starts at; `None` for the bootstrap task.
    pub entry: Option<TaskEntry>,
    /// Opaque word passed to `entry`, in place of the original's `void *data`.
    pub entry_arg: usize,
    /// Lowest address of this task's stack.
    pub stack_bottom: usize,
    /// Highest address of this task's stack (where the stack pointer starts).
    pub stack_top: usize,
}

impl Task {
    pub fn new(name: String, attr: SchedAttr) -> Self {
        Self {
            name,
            state: TaskState::New,
            on_cpu: CPU_AFFINITY_NONE,
            attr,
            flags: TaskFlags::empty(),
            runtime: 0,
            wakeup: 0,
            deadline: 0,
            exec_start: 0,
            total: 0,
            slices: 0,
            parent: None,
            children: Vec::new(),
            entry: None,
            entry_arg: 0,
            stack_bottom: 0,
            stack_top: 0,
        }
    }

    /// A task with an entry point and a caller-provided stack, as spawned by
    /// `kernel::Kernel::create`.
    pub fn spawn(name: String, attr: SchedAttr, entry: TaskEntry, entry_arg: usize, stack_bottom: usize, stack_top: usize) -> Self {
        Self { entry: Some(entry), entry_arg, stack_bottom, stack_top, ..Self::new(name, attr) }
    }
}

/// The task arena: every live task, keyed by its stable [`TaskId`].
pub struct TaskArena {
    tasks: RwLock<BTreeMap<TaskId, Arc<Mutex<Task>>>>,
    next_id: AtomicUsize,
}

impl TaskArena {
    pub const fn new() -> Self {
        Self { tasks: RwLock::new(BTreeMap::new()), next_id: AtomicUsize::new(1) }
    }

    /// Inserts a new task and returns its freshly allocated id.
    pub fn insert(&self, task: Task) -> (TaskId, Arc<Mutex<Task>>) {
        let raw = self.next_id.fetch_add(1, Ordering::AcqRel);
        let id = TaskId(NonZeroUsize::new(raw).expect("task id counter wrapped to zero"));
        let task = Arc::new(Mutex::new(task));
        self.tasks.write().insert(id, Arc::clone(&task));
        (id, task)
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<Mutex<Task>>> {
        self.tasks.read().get(&id).cloned()
    }

    /// Removes a `Dead` task from the arena, reclaiming its slot. The caller
    /// is expected to have already observed `TaskState::Dead`.
    pub fn reclaim(&self, id: TaskId) -> Option<Arc<Mutex<Task>>> {
        self.tasks.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every live task id, for scheduler sweeps that need to
    /// walk the whole arena (e.g. admission re-checks).
    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.read().keys().copied().collect()
    }
}

impl Default for TaskArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::SchedPolicy;

    fn attr() -> SchedAttr {
        SchedAttr { policy: SchedPolicy::Rr, priority: 1, period: 0, wcet: 0, deadline_rel: 0 }
    }

    #[test]
    fn insert_assigns_distinct_ids() {
        let arena = TaskArena::new();
        let (a, _) = arena.insert(Task::new("a".into(), attr()));
        let (b, _) = arena.insert(Task::new("b".into(), attr()));
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn reclaim_removes_dead_task() {
        let arena = TaskArena::new();
        let (id, task) = arena.insert(Task::new("a".into(), attr()));
        task.lock().state = TaskState::Dead;
        assert!(arena.reclaim(id).is_some());
        assert!(arena.get(id).is_none());
    }

    #[test]
    fn spawn_carries_entry_and_stack_bounds() {
        fn entry(_arg: usize) {}
        let t = Task::spawn("worker".into(), attr(), entry, 7, 0x1000, 0x2000);
        assert_eq!(t.entry, Some(entry as TaskEntry));
        assert_eq!(t.entry_arg, 7);
        assert_eq!(t.stack_bottom, 0x1000);
        assert_eq!(t.stack_top, 0x2000);
        assert_eq!(t.state, TaskState::New);
    }

    #[test]
    fn get_shares_the_same_underlying_task() {
        let arena = TaskArena::new();
        let (id, _) = arena.insert(Task::new("a".into(), attr()));
        arena.get(id).unwrap().lock().runtime = 42;
        assert_eq!(arena.get(id).unwrap().lock().runtime, 42);
    }
}
