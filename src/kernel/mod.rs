//! The single `Kernel` context (§9 Design Notes, "Global mutable state").
//!
//! The source scatters `current_set[CPU]`, `sched_list`, the clock-event
//! device lists and the page-map vector as free-standing globals. Per the
//! redesign note, this crate collects the cross-subsystem state those
//! globals held into one struct passed by reference, with per-CPU state
//! reached through [`crate::smp::cpu_id`] rather than a CPU-indexed global
//! array. Boot code owns one `Kernel`, places it at a `'static` location
//! (boxed-and-leaked, or embedded in a `static`), and calls [`Kernel::init`]
//! once before handing `&'static Kernel` to the rest of the system —
//! mirroring this crate's [`crate::smp::register_context`] singleton-
//! registration idiom for the one piece of truly global state that must
//! outlive any single owner.

pub mod logging;

use crate::sched::{edf, round_robin, SchedAttr, SchedError, SchedPolicy, SchedulerRegistry};
use crate::sync::Mutex;
use crate::syscall::SyscallTable;
use crate::task::{Task, TaskArena, TaskEntry, TaskId, TaskState};
use crate::time::{TickSubsystem, WatchdogSubsystem};
use crate::xentium::ProcessingNetwork;
use crate::{KernelError, Ktime, Result};
use alloc::string::String;

fn sched_err(e: SchedError) -> KernelError {
    match e {
        SchedError::InvalidAttr => KernelError::InvalidArgument,
        SchedError::AdmissionDenied => KernelError::AdmissionDenied,
        SchedError::UnknownPolicy => KernelError::NotSupported,
    }
}

pub struct Kernel {
    pub tasks: TaskArena,
    pub schedulers: Mutex<SchedulerRegistry>,
    pub rr: round_robin::RoundRobinScheduler,
    pub edf: edf::EdfScheduler,
    pub tick: TickSubsystem,
    pub watchdog: WatchdogSubsystem,
    pub xentium: ProcessingNetwork,
    pub syscalls: Mutex<SyscallTable>,
}

impl Kernel {
    pub fn new(tick_period_min_ns: Ktime) -> Self {
        Self {
            tasks: TaskArena::new(),
            schedulers: Mutex::new(SchedulerRegistry::new()),
            rr: round_robin::RoundRobinScheduler::new(tick_period_min_ns),
            edf: edf::EdfScheduler::new(edf::DEFAULT_EPSILON),
            tick: TickSubsystem::new(),
            watchdog: WatchdogSubsystem::new(),
            xentium: ProcessingNetwork::new(),
            syscalls: Mutex::new(SyscallTable::new()),
        }
    }

    /// Registers the built-in RR and EDF schedulers. Takes `&'static self`
    /// because the registry only holds `'static` scheduler references —
    /// call this only once `self` lives at a fixed, permanent address.
    pub fn init(&'static self) {
        let mut reg = self.schedulers.lock();
        reg.register(&self.rr);
        reg.register(&self.edf);
    }

    /// Runs the scheduler registry's priority sweep for `cpu`.
    pub fn schedule(&self, cpu: usize, now: Ktime) -> Option<TaskId> {
        self.schedulers.lock().schedule(&self.tasks, cpu, now)
    }

    /// Minimum time until any policy next has a task ready on `cpu`, for
    /// programming the tick device in oneshot mode (§4.4).
    pub fn next_wakeup_ns(&self, cpu: usize, now: Ktime) -> Ktime {
        self.schedulers.lock().task_ready_ns(&self.tasks, cpu, now)
    }

    /// Every freshly created task starts round-robin at minimum priority;
    /// `set_attr` is the only way onto a different policy (and runs
    /// `check_sched_attr` to get there), matching the operation list's
    /// separate `create`/`set_attr` entries.
    fn default_attr() -> SchedAttr {
        SchedAttr { policy: SchedPolicy::Rr, priority: 1, period: 0, wcet: 0, deadline_rel: 0 }
    }

    /// `create(fn, data, cpu, name)`: allocates a task control block for
    /// `entry`, carrying `entry_arg` and the caller-supplied stack bounds.
    /// The task starts `New` on the default policy; it only becomes
    /// runnable once [`Kernel::wake`] admits it.
    pub fn create(&self, name: &str, entry: TaskEntry, entry_arg: usize, cpu: Option<usize>, stack_bottom: usize, stack_top: usize) -> TaskId {
        let mut task = Task::spawn(String::from(name), Self::default_attr(), entry, entry_arg, stack_bottom, stack_top);
        task.on_cpu = cpu.map(|c| c as i32).unwrap_or(crate::task::CPU_AFFINITY_NONE);
        self.tasks.insert(task).0
    }

    /// `init_main()`: promotes the already-running boot path into a task on
    /// `cpu`, bypassing `create`/`wake`'s admission since it has no entry
    /// point or stack of its own to set up.
    pub fn init_main(&self, cpu: usize) -> TaskId {
        let mut task = Task::new(String::from("main"), Self::default_attr());
        task.state = TaskState::Run;
        task.on_cpu = cpu as i32;
        let (id, _) = self.tasks.insert(task);
        if let Some(sched) = self.schedulers.lock().for_policy(SchedPolicy::Rr) {
            sched.enqueue_task(&self.tasks, id);
        }
        id
    }

    /// `wake(task)`: looks up `task`'s policy and affinity and dispatches to
    /// that policy's scheduler to drive its NEW/IDLE → RUN admission,
    /// honoring any CPU affinity already recorded on the task (`None` lets
    /// the policy probe, as EDF does in ascending CPU order).
    pub fn wake(&self, task: TaskId, now: Ktime) -> Result<usize> {
        let slot = self.tasks.get(task).ok_or(KernelError::InvalidArgument)?;
        let (policy, cpu) = {
            let t = slot.lock();
            (t.attr.policy, t.on_cpu)
        };
        let cpu = (cpu != crate::task::CPU_AFFINITY_NONE).then_some(cpu as usize);

        let reg = self.schedulers.lock();
        let sched = reg.for_policy(policy).ok_or(KernelError::NotSupported)?;
        sched.wake_task(&self.tasks, task, cpu, now).map_err(sched_err)
    }

    /// `free(task)`: reclaims a `Dead` task's arena slot.
    pub fn free(&self, task: TaskId) -> Result<()> {
        let slot = self.tasks.get(task).ok_or(KernelError::InvalidArgument)?;
        if slot.lock().state != TaskState::Dead {
            return Err(KernelError::InvalidArgument);
        }
        self.tasks.reclaim(task);
        Ok(())
    }

    /// `set_attr(task, attr)`: runs `attr`'s policy's `check_sched_attr` and,
    /// only if it passes, installs it on `task`.
    pub fn set_attr(&self, task: TaskId, attr: SchedAttr) -> Result<()> {
        let reg = self.schedulers.lock();
        let sched = reg.for_policy(attr.policy).ok_or(KernelError::NotSupported)?;
        sched.check_sched_attr(&attr).map_err(sched_err)?;

        let slot = self.tasks.get(task).ok_or(KernelError::InvalidArgument)?;
        slot.lock().attr = attr;
        Ok(())
    }

    /// `get_attr(task, attr)`, returned rather than written through an
    /// out-parameter.
    pub fn get_attr(&self, task: TaskId) -> Result<SchedAttr> {
        Ok(self.tasks.get(task).ok_or(KernelError::InvalidArgument)?.lock().attr)
    }

    /// `set_policy_default(task)`: resets `task` to round-robin at minimum
    /// priority, e.g. after a failed `set_attr` or on policy teardown.
    pub fn set_policy_default(&self, task: TaskId) -> Result<()> {
        self.set_attr(task, Self::default_attr())
    }

    /// `enqueue(task)`: re-enqueues an already-attributed task with its
    /// policy's scheduler (RR appends to its run or wake list; EDF
    /// reinserts into `admitted[cpu]` if it fell out).
    pub fn enqueue(&self, task: TaskId) -> Result<()> {
        let policy = self.tasks.get(task).ok_or(KernelError::InvalidArgument)?.lock().attr.policy;
        let reg = self.schedulers.lock();
        let sched = reg.for_policy(policy).ok_or(KernelError::NotSupported)?;
        sched.enqueue_task(&self.tasks, task);
        Ok(())
    }

    /// `sched_yield()`: voluntarily gives up `task`'s remaining timeslice.
    /// Implemented as `enqueue` (RR rotates it to the run-queue tail; EDF,
    /// which has no voluntary-yield concept beyond its deadline ordering,
    /// leaves it untouched), the same way the grounding kernel's
    /// `sys_sched_yield` reduces to its scheduler's `enqueue_task`.
    pub fn sched_yield(&self, task: TaskId) -> Result<()> {
        self.enqueue(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;

    fn boot() -> &'static Kernel {
        let kernel = Box::leak(Box::new(Kernel::new(1_000_000)));
        kernel.init();
        kernel
    }

    #[test]
    fn init_registers_both_schedulers() {
        let kernel = boot();
        let reg = kernel.schedulers.lock();
        assert!(reg.for_policy(crate::sched::SchedPolicy::Rr).is_some());
        assert!(reg.for_policy(crate::sched::SchedPolicy::Edf).is_some());
    }

    #[test]
    fn schedule_with_no_tasks_returns_none() {
        let kernel = boot();
        assert!(kernel.schedule(0, 0).is_none());
    }

    fn noop(_arg: usize) {}

    #[test]
    fn create_allocates_a_new_task_with_entry_and_stack() {
        let kernel = boot();
        let id = kernel.create("worker", noop, 9, Some(0), 0x1000, 0x2000);
        let t = kernel.tasks.get(id).unwrap();
        let t = t.lock();
        assert_eq!(t.state, TaskState::New);
        assert_eq!(t.entry, Some(noop as crate::task::TaskEntry));
        assert_eq!(t.entry_arg, 9);
        assert_eq!(t.stack_bottom, 0x1000);
        assert_eq!(t.stack_top, 0x2000);
        assert_eq!(t.attr.policy, SchedPolicy::Rr);
    }

    #[test]
    fn init_main_registers_an_already_running_task() {
        let kernel = boot();
        let id = kernel.init_main(0);
        assert_eq!(kernel.tasks.get(id).unwrap().lock().state, TaskState::Run);
    }

    #[test]
    fn wake_honors_recorded_cpu_affinity() {
        let kernel = boot();
        let id = kernel.create("worker", noop, 0, Some(0), 0, 0);
        assert_eq!(kernel.wake(id, 0).unwrap(), 0);
        assert_eq!(kernel.tasks.get(id).unwrap().lock().state, TaskState::Run);
    }

    #[test]
    fn free_reclaims_only_dead_tasks() {
        let kernel = boot();
        let id = kernel.create("worker", noop, 0, Some(0), 0, 0);
        assert!(kernel.free(id).is_err());
        kernel.tasks.get(id).unwrap().lock().state = TaskState::Dead;
        assert!(kernel.free(id).is_ok());
        assert!(kernel.tasks.get(id).is_none());
    }

    #[test]
    fn set_attr_validates_before_installing() {
        let kernel = boot();
        let id = kernel.create("worker", noop, 0, Some(0), 0, 0);
        let bad = SchedAttr { policy: SchedPolicy::Rr, priority: 0, period: 0, wcet: 0, deadline_rel: 0 };
        assert!(kernel.set_attr(id, bad).is_err());
        assert_eq!(kernel.get_attr(id).unwrap().priority, 1);

        let good = SchedAttr { policy: SchedPolicy::Rr, priority: 5, period: 0, wcet: 0, deadline_rel: 0 };
        kernel.set_attr(id, good).unwrap();
        assert_eq!(kernel.get_attr(id).unwrap().priority, 5);
    }

    #[test]
    fn set_policy_default_resets_to_rr_priority_one() {
        let kernel = boot();
        let id = kernel.create("worker", noop, 0, Some(0), 0, 0);
        let edf_attr = SchedAttr { policy: SchedPolicy::Edf, priority: 0, period: 1000, wcet: 100, deadline_rel: 900 };
        kernel.set_attr(id, edf_attr).unwrap();
        kernel.set_policy_default(id).unwrap();
        let attr = kernel.get_attr(id).unwrap();
        assert_eq!(attr.policy, SchedPolicy::Rr);
        assert_eq!(attr.priority, 1);
    }

    #[test]
    fn sched_yield_requeues_the_task() {
        let kernel = boot();
        let id = kernel.create("worker", noop, 0, Some(0), 0, 0);
        kernel.wake(id, 0).unwrap();
        assert!(kernel.sched_yield(id).is_ok());
    }

    #[test]
    fn enqueue_reinserts_an_edf_task_missing_from_its_cpu() {
        let kernel = boot();
        let id = kernel.create("periodic", noop, 0, Some(0), 0, 0);
        let edf_attr = SchedAttr { policy: SchedPolicy::Edf, priority: 0, period: 1000, wcet: 100, deadline_rel: 900 };
        kernel.set_attr(id, edf_attr).unwrap();
        kernel.wake(id, 0).unwrap();
        assert!(kernel.enqueue(id).is_ok());
    }

    #[test]
    fn next_wakeup_ns_reflects_an_idle_edf_task() {
        let kernel = boot();
        let id = kernel.create("periodic", noop, 0, Some(0), 0, 0);
        let edf_attr = SchedAttr { policy: SchedPolicy::Edf, priority: 0, period: 1000, wcet: 100, deadline_rel: 900 };
        kernel.set_attr(id, edf_attr).unwrap();
        kernel.wake(id, 0).unwrap();
        kernel.tasks.get(id).unwrap().lock().runtime = 0;
        assert!(kernel.schedule(0, 0).is_none());
        assert_eq!(kernel.next_wakeup_ns(0, 400), 600);
    }
}
