//! Architecture-abstract per-CPU context switch and IRQ control (Design
//! Notes §9).
//!
//! SPARC traps, register-window flush instructions and software traps for
//! reboot/die are an architecture concern outside this crate. In their
//! place this module defines [`Context`], a small trait the platform
//! implements once and registers at boot — mirroring how the grounding
//! kernel registers its PLIC singleton before interrupts are used.

use crate::config::SMP_CPUS_MAX;
use crate::sync::Mutex;

/// Opaque saved-register blob for one task. The architecture decides how
/// many of these 32 words it actually uses.
pub type TaskRegisters = [u64; 32];

/// Architecture hook for context switch and IRQ control. Implemented once by
/// the platform bring-up code and registered via [`register_context`].
pub trait Context: Send + Sync {
    /// Saves the registers of the task currently running on this CPU.
    fn save_current(&self) -> TaskRegisters;

    /// Restores `next` onto the current CPU. Must only be called from
    /// `schedule()` running on the CPU that will execute `next`.
    fn restore(&self, next: &TaskRegisters);

    /// Disables IRQs on the current CPU, returning whether they were
    /// previously enabled.
    fn disable_irq(&self) -> bool;

    /// Restores the IRQ-enabled state returned by a prior `disable_irq`.
    fn restore_irq(&self, was_enabled: bool);

    /// Sends an inter-processor reschedule request. After this returns, the
    /// target CPU is guaranteed to re-run its scheduler within one tick
    /// period.
    fn send_reschedule(&self, cpu: usize);

    /// Identifies the CPU executing the call, in `0..SMP_CPUS_MAX`.
    fn cpu_id(&self) -> usize;
}

static CONTEXT: Mutex<Option<&'static dyn Context>> = Mutex::new(None);

/// Registers the platform's `Context` implementation. Must be called once
/// during boot before any other function in this module is used.
pub fn register_context(ctx: &'static dyn Context) {
    *CONTEXT.lock() = Some(ctx);
}

fn context() -> &'static dyn Context {
    CONTEXT.lock().expect("smp: no architecture Context registered")
}

/// Identifies the CPU executing the call.
pub fn cpu_id() -> usize {
    let id = context().cpu_id();
    debug_assert!(id < SMP_CPUS_MAX, "cpu_id out of configured range");
    id
}

/// Sends the cross-CPU reschedule IPI, the only inter-CPU ordering
/// primitive (§7).
pub fn send_reschedule(cpu: usize) {
    context().send_reschedule(cpu);
}

/// Performs a context switch: saves `current`'s registers (returned to the
/// caller for bookkeeping) and restores `next`.
pub fn switch_to(next: &TaskRegisters) -> TaskRegisters {
    let _guard = IrqGuard::new();
    let saved = context().save_current();
    context().restore(next);
    saved
}

/// RAII IRQ-disable guard: disables IRQs on construction, restores the prior
/// state on drop. Used to bound the short critical sections the
/// shared-resource policy requires around runqueues, the page map and
/// clock-event device lists.
pub struct IrqGuard(bool);

impl IrqGuard {
    pub fn new() -> Self {
        Self(context().disable_irq())
    }
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        context().restore_irq(self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockContext {
        irq_enabled: AtomicBool,
        reschedules: AtomicUsize,
    }

    impl Context for MockContext {
        fn save_current(&self) -> TaskRegisters {
            [0; 32]
        }

        fn restore(&self, _next: &TaskRegisters) {}

        fn disable_irq(&self) -> bool {
            self.irq_enabled.swap(false, Ordering::SeqCst)
        }

        fn restore_irq(&self, was_enabled: bool) {
            self.irq_enabled.store(was_enabled, Ordering::SeqCst);
        }

        fn send_reschedule(&self, _cpu: usize) {
            self.reschedules.fetch_add(1, Ordering::SeqCst);
        }

        fn cpu_id(&self) -> usize {
            0
        }
    }

    static MOCK: MockContext = MockContext { irq_enabled: AtomicBool::new(true), reschedules: AtomicUsize::new(0) };

    #[test]
    fn irq_guard_restores_prior_state() {
        register_context(&MOCK);
        MOCK.irq_enabled.store(true, Ordering::SeqCst);
        {
            let _g = IrqGuard::new();
            assert!(!MOCK.irq_enabled.load(Ordering::SeqCst));
        }
        assert!(MOCK.irq_enabled.load(Ordering::SeqCst));
    }

    #[test]
    fn cpu_id_is_in_range() {
        register_context(&MOCK);
        assert!(cpu_id() < SMP_CPUS_MAX);
    }

    #[test]
    fn send_reschedule_reaches_context() {
        register_context(&MOCK);
        let before = MOCK.reschedules.load(Ordering::SeqCst);
        send_reschedule(0);
        assert_eq!(MOCK.reschedules.load(Ordering::SeqCst), before + 1);
    }
}
