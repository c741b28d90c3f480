//! Multi-policy task scheduler (§4.3).
//!
//! Grounded on `original_source/include/kernel/sched.h`'s `struct scheduler`
//! (a table of `pick_next_task`/`wake_next_task`/`enqueue_task`/
//! `timeslice_ns`/`task_ready_ns`/`check_sched_attr` function pointers kept
//! on a priority-ordered list) — here expressed as the [`Scheduler`] trait
//! and a priority-ordered [`SchedulerRegistry`], following the same
//! `dyn`-trait-object registry idiom as [`crate::smp::Context`].

pub mod edf;
pub mod round_robin;

use crate::task::{TaskArena, TaskId};
use crate::Ktime;
use alloc::vec::Vec;

/// `enum sched_policy { SCHED_RR, SCHED_EDF, SCHED_FIFO, SCHED_OTHER }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    Rr,
    Edf,
    Fifo,
    Other,
}

/// `struct sched_attr`.
#[derive(Debug, Clone, Copy)]
pub struct SchedAttr {
    pub policy: SchedPolicy,
    /// Static priority for RR/FIFO (must be ≥ 1).
    pub priority: u64,
    /// Wakeup period, for EDF/RMS-style policies.
    pub period: Ktime,
    /// Worst-case execution time per period.
    pub wcet: Ktime,
    /// Relative deadline from the start of a wakeup.
    pub deadline_rel: Ktime,
}

/// Why a scheduling policy rejected a task at `wake`/attribute-check time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// `check_sched_attr` rejected the attribute set (wrong policy tag,
    /// `C > D > T` violated, zero priority, ...).
    InvalidAttr,
    /// The EDF admission test failed on every candidate CPU.
    AdmissionDenied,
    /// `wake` was called against a policy this scheduler does not serve.
    UnknownPolicy,
}

pub type SchedResult<T> = core::result::Result<T, SchedError>;

/// A registered scheduling strategy, queried in priority order on every
/// scheduling decision (§4.3 "Multi-policy selection").
pub trait Scheduler: Send + Sync {
    fn policy(&self) -> SchedPolicy;

    /// Scheduler priority; higher values are queried first by
    /// [`SchedulerRegistry::schedule`].
    fn sched_priority(&self) -> u64;

    /// Picks the next task to run on `cpu`, or `None` if this policy has
    /// nothing ready there.
    fn pick_next(&self, arena: &TaskArena, cpu: usize, now: Ktime) -> Option<TaskId>;

    /// Moves a task out of its policy wake list onto a CPU's run list,
    /// performing any policy-specific admission test. Returns the CPU the
    /// task was placed on.
    fn wake_task(&self, arena: &TaskArena, task: TaskId, cpu: Option<usize>, now: Ktime) -> SchedResult<usize>;

    /// Enqueues a freshly created or re-armed task.
    fn enqueue_task(&self, arena: &TaskArena, task: TaskId);

    /// The timeslice a task of this policy should receive.
    fn timeslice_ns(&self, arena: &TaskArena, task: TaskId) -> Ktime;

    /// Time until this policy next has a task ready on `cpu`, used to
    /// program the tick device in oneshot mode (§4.4). Needs the arena to
    /// see admitted-but-idle tasks' wakeups; `0` means "nothing known, ask
    /// again on the next tick" rather than "ready now".
    fn task_ready_ns(&self, arena: &TaskArena, cpu: usize, now: Ktime) -> Ktime;

    /// Sanity-checks a `sched_attr` meant for this policy.
    fn check_sched_attr(&self, attr: &SchedAttr) -> SchedResult<()>;
}

/// Schedulers ordered by descending `sched_priority`; `schedule()` queries
/// them in that order and the first non-null pick wins. EDF is registered
/// at a higher priority than RR so an admitted EDF task always preempts RR
/// work on the same CPU.
pub struct SchedulerRegistry {
    schedulers: Vec<&'static dyn Scheduler>,
}

impl SchedulerRegistry {
    pub const fn new() -> Self {
        Self { schedulers: Vec::new() }
    }

    /// Registers a scheduler, keeping the list sorted by descending
    /// priority.
    pub fn register(&mut self, sched: &'static dyn Scheduler) {
        let pos = self.schedulers.partition_point(|s| s.sched_priority() > sched.sched_priority());
        self.schedulers.insert(pos, sched);
    }

    pub fn iter(&self) -> impl Iterator<Item = &&'static dyn Scheduler> {
        self.schedulers.iter()
    }

    /// Queries schedulers in priority order; the first to return a pick
    /// wins.
    pub fn schedule(&self, arena: &TaskArena, cpu: usize, now: Ktime) -> Option<TaskId> {
        self.schedulers.iter().find_map(|s| s.pick_next(arena, cpu, now))
    }

    /// Finds the scheduler registered for `policy`.
    pub fn for_policy(&self, policy: SchedPolicy) -> Option<&'static dyn Scheduler> {
        self.schedulers.iter().copied().find(|s| s.policy() == policy)
    }

    /// Minimum `task_ready_ns` across every registered scheduler, for
    /// programming the tick device in oneshot mode. Schedulers that report
    /// `0` ("nothing known") are excluded rather than forcing the minimum to
    /// zero; if none report anything, `0` is returned meaning "fall back to
    /// periodic retry".
    pub fn task_ready_ns(&self, arena: &TaskArena, cpu: usize, now: Ktime) -> Ktime {
        self.schedulers.iter().map(|s| s.task_ready_ns(arena, cpu, now)).filter(|&ns| ns > 0).min().unwrap_or(0)
    }
}

impl Default for SchedulerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
