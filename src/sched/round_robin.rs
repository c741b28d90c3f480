//! Round-robin fallback scheduler (§4.3.2).
//!
//! Grounded on `original_source/kernel/sched/rr.c`: a per-CPU run list
//! rotated tail-on-pick, a shared wake list, and a timeslice of
//! `priority * tick_period_min_ns * 50` — the `* 50` factor is taken
//! verbatim from `rr_timeslice_ns`, which the source comments describe as a
//! deliberately generous multiplier so RR does not starve periodic work.

use crate::config::SMP_CPUS_MAX;
use crate::sched::{SchedAttr, SchedError, SchedPolicy, SchedResult, Scheduler};
use crate::sync::Mutex;
use crate::task::{TaskArena, TaskId, TaskState};
use crate::Ktime;
use alloc::collections::VecDeque;

/// Extra factor applied on top of `priority * tick_period_min_ns`, matching
/// the grounding source's `rr_timeslice_ns`.
pub const TIMESLICE_FACTOR: u64 = 50;

const EMPTY_RUN: VecDeque<TaskId> = VecDeque::new();

pub struct RoundRobinScheduler {
    run: Mutex<[VecDeque<TaskId>; SMP_CPUS_MAX]>,
    wake: Mutex<VecDeque<TaskId>>,
    tick_period_min_ns: Ktime,
}

impl RoundRobinScheduler {
    pub const fn new(tick_period_min_ns: Ktime) -> Self {
        Self { run: Mutex::new([EMPTY_RUN; SMP_CPUS_MAX]), wake: Mutex::new(VecDeque::new()), tick_period_min_ns }
    }

    fn runtime_for(&self, priority: u64) -> Ktime {
        priority * self.tick_period_min_ns
    }
}

impl Scheduler for RoundRobinScheduler {
    fn policy(&self) -> SchedPolicy {
        SchedPolicy::Rr
    }

    fn sched_priority(&self) -> u64 {
        0
    }

    fn pick_next(&self, arena: &TaskArena, cpu: usize, _now: Ktime) -> Option<TaskId> {
        let mut run = self.run.lock();
        let q = &mut run[cpu];
        let len = q.len();

        for _ in 0..len {
            let id = *q.front()?;
            let Some(task) = arena.get(id) else {
                q.pop_front();
                continue;
            };
            let mut t = task.lock();

            let affinity_ok = t.on_cpu == crate::task::CPU_AFFINITY_NONE || t.on_cpu == cpu as i32;
            if !affinity_ok {
                q.rotate_left(1);
                continue;
            }

            match t.state {
                TaskState::Run => {
                    q.rotate_left(1);
                    t.runtime = self.runtime_for(t.attr.priority);
                    return Some(id);
                }
                TaskState::Idle => {
                    q.rotate_left(1);
                    return None;
                }
                TaskState::Dead => {
                    q.pop_front();
                    return None;
                }
                TaskState::New | TaskState::Busy => return None,
            }
        }

        None
    }

    fn wake_task(&self, arena: &TaskArena, task: TaskId, cpu: Option<usize>, _now: Ktime) -> SchedResult<usize> {
        let cpu = cpu.unwrap_or(0);
        let Some(t) = arena.get(task) else {
            return Err(SchedError::UnknownPolicy);
        };
        {
            let mut t = t.lock();
            if t.attr.policy != SchedPolicy::Rr {
                return Err(SchedError::InvalidAttr);
            }
            t.state = TaskState::Run;
        }
        self.wake.lock().retain(|&id| id != task);
        self.run.lock()[cpu].push_back(task);
        Ok(cpu)
    }

    fn enqueue_task(&self, arena: &TaskArena, task: TaskId) {
        let Some(t) = arena.get(task) else { return };
        let (state, cpu) = {
            let mut t = t.lock();
            t.runtime = self.runtime_for(t.attr.priority);
            (t.state, t.on_cpu)
        };

        if matches!(state, TaskState::Run) {
            let cpu = if cpu == crate::task::CPU_AFFINITY_NONE { 0 } else { cpu as usize };
            self.run.lock()[cpu].push_back(task);
        } else {
            self.wake.lock().push_back(task);
        }
    }

    fn timeslice_ns(&self, arena: &TaskArena, task: TaskId) -> Ktime {
        match arena.get(task) {
            Some(t) => self.runtime_for(t.lock().attr.priority) * TIMESLICE_FACTOR,
            None => 0,
        }
    }

    /// RR tasks are always ready and carry no deadline.
    fn task_ready_ns(&self, _arena: &TaskArena, _cpu: usize, _now: Ktime) -> Ktime {
        0
    }

    fn check_sched_attr(&self, attr: &SchedAttr) -> SchedResult<()> {
        if attr.policy != SchedPolicy::Rr {
            return Err(SchedError::InvalidAttr);
        }
        if attr.priority == 0 {
            log::warn!("sched_rr: minimum priority is 1, attribute rejected");
            return Err(SchedError::InvalidAttr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn rr_attr(priority: u64) -> SchedAttr {
        SchedAttr { policy: SchedPolicy::Rr, priority, period: 0, wcet: 0, deadline_rel: 0 }
    }

    #[test]
    fn timeslice_matches_priority_times_period_times_factor() {
        let sched = RoundRobinScheduler::new(1000);
        let arena = TaskArena::new();
        let (id, _) = arena.insert(Task::new("t".into(), rr_attr(3)));
        assert_eq!(sched.timeslice_ns(&arena, id), 3 * 1000 * TIMESLICE_FACTOR);
    }

    #[test]
    fn task_ready_ns_is_always_zero() {
        let sched = RoundRobinScheduler::new(1000);
        let arena = TaskArena::new();
        assert_eq!(sched.task_ready_ns(&arena, 0, 12345), 0);
    }

    #[test]
    fn wake_then_pick_rotates_to_tail() {
        let sched = RoundRobinScheduler::new(1000);
        let arena = TaskArena::new();
        let (a, _) = arena.insert(Task::new("a".into(), rr_attr(1)));
        let (b, _) = arena.insert(Task::new("b".into(), rr_attr(1)));

        sched.enqueue_task(&arena, a);
        sched.enqueue_task(&arena, b);
        arena.get(a).unwrap().lock().state = TaskState::Run;
        arena.get(b).unwrap().lock().state = TaskState::Run;
        sched.run.lock()[0].push_back(a);
        sched.run.lock()[0].push_back(b);

        let first = sched.pick_next(&arena, 0, 0).unwrap();
        let second = sched.pick_next(&arena, 0, 0).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn check_sched_attr_rejects_zero_priority() {
        let sched = RoundRobinScheduler::new(1000);
        assert!(sched.check_sched_attr(&rr_attr(0)).is_err());
    }

    #[test]
    fn check_sched_attr_rejects_foreign_policy() {
        let sched = RoundRobinScheduler::new(1000);
        let attr = SchedAttr { policy: SchedPolicy::Edf, priority: 1, period: 0, wcet: 0, deadline_rel: 0 };
        assert!(sched.check_sched_attr(&attr).is_err());
    }
}
