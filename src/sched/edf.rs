//! Earliest-deadline-first scheduler with per-CPU admission test (§4.3.1).
//!
//! The grounding kernel computes its admission test inline inside
//! `sched_wake` rather than in a standalone translation unit (§9's Open
//! Questions note the slack `ε` is left unspecified there); this module
//! gives that test a home and a configurable `ε`, defaulting to 2% per
//! DESIGN.md.

use crate::config::SMP_CPUS_MAX;
use crate::sched::{SchedAttr, SchedError, SchedPolicy, SchedResult, Scheduler};
use crate::sync::Mutex;
use crate::task::{TaskArena, TaskId, TaskState};
use crate::Ktime;
use alloc::vec::Vec;

/// Default admission slack, typical of the "a few percent" the
/// specification calls for.
pub const DEFAULT_EPSILON: f64 = 0.02;

const EMPTY_ADMITTED: Vec<TaskId> = Vec::new();

pub struct EdfScheduler {
    admitted: Mutex<[Vec<TaskId>; SMP_CPUS_MAX]>,
    epsilon: f64,
}

impl EdfScheduler {
    pub const fn new(epsilon: f64) -> Self {
        Self { admitted: Mutex::new([EMPTY_ADMITTED; SMP_CPUS_MAX]), epsilon }
    }

    fn utilization_sum(arena: &TaskArena, admitted: &[TaskId]) -> f64 {
        admitted
            .iter()
            .filter_map(|&id| arena.get(id))
            .map(|t| {
                let t = t.lock();
                t.attr.wcet as f64 / t.attr.period as f64
            })
            .sum()
    }

    fn density_sum(arena: &TaskArena, admitted: &[TaskId]) -> f64 {
        admitted
            .iter()
            .filter_map(|&id| arena.get(id))
            .map(|t| {
                let t = t.lock();
                let min_dt = t.attr.deadline_rel.min(t.attr.period);
                t.attr.wcet as f64 / min_dt as f64
            })
            .sum()
    }

    /// Utilisation + deadline-density admission test for a candidate
    /// `attr` against the tasks already admitted on `cpu`.
    fn admits(&self, arena: &TaskArena, cpu: usize, attr: &SchedAttr) -> bool {
        let admitted = self.admitted.lock();
        let util = Self::utilization_sum(arena, &admitted[cpu]) + attr.wcet as f64 / attr.period as f64;
        if util > 1.0 - self.epsilon {
            return false;
        }

        let min_dt = attr.deadline_rel.min(attr.period);
        let density = Self::density_sum(arena, &admitted[cpu]) + attr.wcet as f64 / min_dt as f64;
        density <= 1.0 - self.epsilon
    }

    /// Re-arms a task against its next period, per §4.3.1: budget
    /// exhaustion and missed deadlines both fall back to the same re-arm.
    fn rearm(&self, t: &mut crate::task::Task, now: Ktime) {
        if now > t.deadline {
            log::warn!("sched_edf: task '{}' missed its deadline at {now}", t.name);
        }
        t.wakeup += t.attr.period;
        t.deadline = t.wakeup + t.attr.deadline_rel;
        t.runtime = t.attr.wcet;
        t.state = TaskState::Idle;
    }
}

impl Scheduler for EdfScheduler {
    fn policy(&self) -> SchedPolicy {
        SchedPolicy::Edf
    }

    fn sched_priority(&self) -> u64 {
        10
    }

    fn pick_next(&self, arena: &TaskArena, cpu: usize, now: Ktime) -> Option<TaskId> {
        let admitted = self.admitted.lock();
        let mut best: Option<(Ktime, TaskId)> = None;

        for &id in admitted[cpu].iter() {
            let Some(task) = arena.get(id) else { continue };
            let mut t = task.lock();

            if t.state == TaskState::Idle && now >= t.wakeup {
                t.state = TaskState::Run;
            }

            if t.state != TaskState::Run {
                continue;
            }

            if t.runtime <= 0 || now > t.deadline {
                self.rearm(&mut t, now);
                continue;
            }

            match best {
                Some((deadline, best_id)) if (t.deadline, id.get()) >= (deadline, best_id.get()) => {}
                _ => best = Some((t.deadline, id)),
            }
        }

        best.map(|(_, id)| id)
    }

    fn wake_task(&self, arena: &TaskArena, task: TaskId, cpu: Option<usize>, now: Ktime) -> SchedResult<usize> {
        let Some(t) = arena.get(task) else {
            return Err(SchedError::UnknownPolicy);
        };
        let attr = {
            let t = t.lock();
            if t.attr.policy != SchedPolicy::Edf {
                return Err(SchedError::InvalidAttr);
            }
            t.attr
        };

        let chosen = match cpu {
            Some(c) => self.admits(arena, c, &attr).then_some(c),
            None => (0..SMP_CPUS_MAX).find(|&c| self.admits(arena, c, &attr)),
        };

        let Some(cpu) = chosen else {
            return Err(SchedError::AdmissionDenied);
        };

        {
            let mut t = t.lock();
            t.on_cpu = cpu as i32;
            t.state = TaskState::Run;
            t.wakeup = now;
            t.deadline = now + attr.deadline_rel;
            t.runtime = attr.wcet;
        }
        self.admitted.lock()[cpu].push(task);
        Ok(cpu)
    }

    fn enqueue_task(&self, arena: &TaskArena, task: TaskId) {
        let Some(t) = arena.get(task) else { return };
        let cpu = t.lock().on_cpu;
        if cpu != crate::task::CPU_AFFINITY_NONE {
            let cpu = cpu as usize;
            let mut admitted = self.admitted.lock();
            if !admitted[cpu].contains(&task) {
                admitted[cpu].push(task);
            }
        }
    }

    fn timeslice_ns(&self, arena: &TaskArena, task: TaskId) -> Ktime {
        arena.get(task).map(|t| t.lock().runtime).unwrap_or(0)
    }

    /// Minimum time until an admitted-but-idle task's `wakeup` elapses, so
    /// the tick device can be reprogrammed in oneshot mode instead of
    /// falling back to periodic polling. Zero means no idle task is known —
    /// "ask again on the next tick".
    fn task_ready_ns(&self, arena: &TaskArena, cpu: usize, now: Ktime) -> Ktime {
        let admitted = self.admitted.lock();
        admitted[cpu]
            .iter()
            .filter_map(|&id| arena.get(id))
            .filter_map(|t| {
                let t = t.lock();
                (t.state == TaskState::Idle).then(|| t.wakeup.saturating_sub(now))
            })
            .min()
            .unwrap_or(0)
    }

    fn check_sched_attr(&self, attr: &SchedAttr) -> SchedResult<()> {
        if attr.policy != SchedPolicy::Edf {
            return Err(SchedError::InvalidAttr);
        }
        if attr.period == 0 || attr.wcet == 0 {
            return Err(SchedError::InvalidAttr);
        }
        if !(attr.wcet <= attr.deadline_rel && attr.deadline_rel <= attr.period) {
            log::warn!("sched_edf: attribute violates C <= D <= T");
            return Err(SchedError::InvalidAttr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn edf_attr(period: Ktime, wcet: Ktime, deadline_rel: Ktime) -> SchedAttr {
        SchedAttr { policy: SchedPolicy::Edf, priority: 0, period, wcet, deadline_rel }
    }

    /// Scenario 2 from §8: one admitted {T=1000,C=500,D=800} (µs, scaled to
    /// ns-equivalent ratios); a second {T=1000,C=600,D=900} must be
    /// rejected — density ≈ 0.5/0.8 + 0.6/0.9 ≈ 1.29 > 1-ε.
    #[test]
    fn scenario_density_test_rejects_oversubscription() {
        let sched = EdfScheduler::new(DEFAULT_EPSILON);
        let arena = TaskArena::new();

        let (first, _) = arena.insert(Task::new("first".into(), edf_attr(1000, 500, 800)));
        assert_eq!(sched.wake_task(&arena, first, Some(0), 0).unwrap(), 0);

        let (second, _) = arena.insert(Task::new("second".into(), edf_attr(1000, 600, 900)));
        assert_eq!(sched.wake_task(&arena, second, Some(0), 0), Err(SchedError::AdmissionDenied));
    }

    #[test]
    fn admits_independent_cpus_separately() {
        let sched = EdfScheduler::new(DEFAULT_EPSILON);
        let arena = TaskArena::new();

        let (a, _) = arena.insert(Task::new("a".into(), edf_attr(1000, 900, 1000)));
        assert_eq!(sched.wake_task(&arena, a, None, 0).unwrap(), 0);

        let (b, _) = arena.insert(Task::new("b".into(), edf_attr(1000, 900, 1000)));
        // cpu 0 is saturated; probing should land the second task on cpu 1
        assert_eq!(sched.wake_task(&arena, b, None, 0).unwrap(), 1);
    }

    #[test]
    fn pick_next_prefers_earliest_deadline() {
        let sched = EdfScheduler::new(DEFAULT_EPSILON);
        let arena = TaskArena::new();

        let (late, _) = arena.insert(Task::new("late".into(), edf_attr(10_000, 1000, 9000)));
        let (early, _) = arena.insert(Task::new("early".into(), edf_attr(10_000, 1000, 2000)));
        sched.wake_task(&arena, late, Some(0), 0).unwrap();
        sched.wake_task(&arena, early, Some(0), 0).unwrap();

        assert_eq!(sched.pick_next(&arena, 0, 0), Some(early));
    }

    #[test]
    fn check_sched_attr_enforces_c_le_d_le_t() {
        let sched = EdfScheduler::new(DEFAULT_EPSILON);
        assert!(sched.check_sched_attr(&edf_attr(1000, 1100, 1050)).is_err());
    }

    #[test]
    fn task_ready_ns_reports_earliest_idle_wakeup() {
        let sched = EdfScheduler::new(DEFAULT_EPSILON);
        let arena = TaskArena::new();
        let (id, task) = arena.insert(Task::new("t".into(), edf_attr(1000, 100, 900)));
        sched.wake_task(&arena, id, Some(0), 0).unwrap();

        task.lock().runtime = 0;
        assert_eq!(sched.pick_next(&arena, 0, 0), None);
        assert_eq!(task.lock().state, TaskState::Idle);

        assert_eq!(sched.task_ready_ns(&arena, 0, 400), 600);
    }

    #[test]
    fn task_ready_ns_is_zero_with_no_idle_task() {
        let sched = EdfScheduler::new(DEFAULT_EPSILON);
        let arena = TaskArena::new();
        assert_eq!(sched.task_ready_ns(&arena, 0, 0), 0);
    }

    #[test]
    fn exhausted_budget_parks_idle_and_rearms() {
        let sched = EdfScheduler::new(DEFAULT_EPSILON);
        let arena = TaskArena::new();
        let (id, task) = arena.insert(Task::new("t".into(), edf_attr(1000, 100, 900)));
        sched.wake_task(&arena, id, Some(0), 0).unwrap();

        task.lock().runtime = 0;
        assert_eq!(sched.pick_next(&arena, 0, 0), None);
        let t = task.lock();
        assert_eq!(t.state, TaskState::Idle);
        assert_eq!(t.wakeup, 1000);
        assert_eq!(t.runtime, 100);
    }
}
