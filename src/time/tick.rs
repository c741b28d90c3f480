//! Per-CPU tick device (§4.4), periodic or one-shot.
//!
//! Grounded on `original_source/include/kernel/tick.h` / the tick-device
//! selection logic alongside it in `watchdog.c`'s
//! `watchdog_check_preferred`: the best-rated device offering the required
//! features wins, and ties keep the incumbent.

use crate::time::clockevent::{ClockEventDevice, ClockEventState};
use crate::sync::Mutex;
use crate::Ktime;

/// `enum tick_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickMode {
    Periodic,
    Oneshot,
}

/// Tracks the single best clock-event device currently driving the periodic
/// tick, and its mode.
pub struct TickSubsystem {
    device: Mutex<Option<&'static ClockEventDevice>>,
    mode: Mutex<TickMode>,
}

impl TickSubsystem {
    pub const fn new() -> Self {
        Self { device: Mutex::new(None), mode: Mutex::new(TickMode::Periodic) }
    }

    /// Offers a new clock-event device; it replaces the incumbent only if
    /// it has the periodic+oneshot+ktime features and a better (lower)
    /// rating.
    pub fn check_device(&self, dev: &'static ClockEventDevice) {
        use crate::time::clockevent::ClockEventFeatures;
        let required = ClockEventFeatures::PERIODIC | ClockEventFeatures::ONESHOT | ClockEventFeatures::KTIME;
        if !dev.features.contains(required) {
            return;
        }

        let mut cur = self.device.lock();
        let better = match *cur {
            None => true,
            Some(incumbent) => dev.rating < incumbent.rating,
        };
        if better {
            *cur = Some(dev);
            dev.set_state(match *self.mode.lock() {
                TickMode::Periodic => ClockEventState::Periodic,
                TickMode::Oneshot => ClockEventState::Oneshot,
            });
        }
    }

    pub fn device(&self) -> Option<&'static ClockEventDevice> {
        *self.device.lock()
    }

    pub fn set_mode(&self, mode: TickMode) -> crate::Result<()> {
        let dev = self.device.lock().ok_or(crate::KernelError::NoDevice)?;
        *self.mode.lock() = mode;
        dev.set_state(match mode {
            TickMode::Periodic => ClockEventState::Periodic,
            TickMode::Oneshot => ClockEventState::Oneshot,
        });
        Ok(())
    }

    pub fn set_next_ns(&self, nanoseconds: u32) -> crate::Result<bool> {
        let dev = self.device.lock().ok_or(crate::KernelError::NoDevice)?;
        Ok(dev.program_timeout_ns(nanoseconds))
    }

    pub fn set_next_ktime(&self, expires: Ktime, now: Ktime) -> crate::Result<bool> {
        let dev = self.device.lock().ok_or(crate::KernelError::NoDevice)?;
        dev.program_event(expires, now)
    }
}

impl Default for TickSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::clockevent::{ClockEventDriver, ClockEventFeatures};
    use alloc::boxed::Box;

    struct NullDriver;
    impl ClockEventDriver for NullDriver {
        fn set_next_event(&self, _ticks: u32, _state: ClockEventState) {}
        fn set_state(&self, _state: ClockEventState) {}
    }
    static DRIVER: NullDriver = NullDriver;

    fn device(rating: u32, features: ClockEventFeatures) -> ClockEventDevice {
        ClockEventDevice::new("t", features, rating, 8, 100, 1_000_000, 1, &DRIVER)
    }

    const FULL: ClockEventFeatures = ClockEventFeatures::PERIODIC.union(ClockEventFeatures::ONESHOT).union(ClockEventFeatures::KTIME);

    #[test]
    fn rejects_device_missing_required_features() {
        let tick = TickSubsystem::new();
        let dev = device(10, ClockEventFeatures::PERIODIC);
        tick.check_device(Box::leak(alloc::boxed::Box::new(dev)));
        assert!(tick.device().is_none());
    }

    #[test]
    fn first_qualifying_device_is_accepted() {
        let tick = TickSubsystem::new();
        let dev: &'static _ = Box::leak(alloc::boxed::Box::new(device(50, FULL)));
        tick.check_device(dev);
        assert!(core::ptr::eq(tick.device().unwrap(), dev));
    }

    #[test]
    fn better_rated_device_replaces_incumbent() {
        let tick = TickSubsystem::new();
        let worse: &'static _ = Box::leak(alloc::boxed::Box::new(device(50, FULL)));
        let better: &'static _ = Box::leak(alloc::boxed::Box::new(device(10, FULL)));
        tick.check_device(worse);
        tick.check_device(better);
        assert!(core::ptr::eq(tick.device().unwrap(), better));
    }

    #[test]
    fn worse_rated_device_does_not_replace_incumbent() {
        let tick = TickSubsystem::new();
        let better: &'static _ = Box::leak(alloc::boxed::Box::new(device(10, FULL)));
        let worse: &'static _ = Box::leak(alloc::boxed::Box::new(device(50, FULL)));
        tick.check_device(better);
        tick.check_device(worse);
        assert!(core::ptr::eq(tick.device().unwrap(), better));
    }

    #[test]
    fn set_next_ns_without_device_reports_no_device() {
        let tick = TickSubsystem::new();
        assert!(tick.set_next_ns(1000).is_err());
    }
}
