//! Watchdog subsystem (§4.4).
//!
//! Grounded on `original_source/kernel/watchdog.c`: a single best-rated
//! device with the watchdog feature, fed with a timeout via
//! `clockevents_program_timeout_ns`, and a user bark handler invoked from
//! the device's event callback. The device "stays dormant until fed for
//! the first time", per the source's own note.

use crate::sync::Mutex;
use crate::time::clockevent::{ClockEventDevice, ClockEventFeatures, ClockEventState};
use alloc::boxed::Box;

/// `enum watchdog_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogMode {
    Unleash,
    Leash,
}

pub struct WatchdogSubsystem {
    device: Mutex<Option<&'static ClockEventDevice>>,
    handler: Mutex<Option<Box<dyn Fn() + Send>>>,
    fed_once: core::sync::atomic::AtomicBool,
}

impl WatchdogSubsystem {
    pub const fn new() -> Self {
        Self { device: Mutex::new(None), handler: Mutex::new(None), fed_once: core::sync::atomic::AtomicBool::new(false) }
    }

    /// Offers a new clock-event device; accepted only if it carries the
    /// watchdog feature and no device is registered yet (the grounding
    /// source's `watchdog_check_preferred` never supersedes an incumbent).
    pub fn check_device(&self, dev: &'static ClockEventDevice) {
        if !dev.features.contains(ClockEventFeatures::WATCHDOG) {
            return;
        }
        let mut cur = self.device.lock();
        if cur.is_none() {
            *cur = Some(dev);
            dev.set_state(ClockEventState::Watchdog);
        }
    }

    pub fn device(&self) -> Option<&'static ClockEventDevice> {
        *self.device.lock()
    }

    pub fn set_mode(&self, mode: WatchdogMode) -> crate::Result<()> {
        let dev = self.device.lock().ok_or(crate::KernelError::NoDevice)?;
        dev.set_state(match mode {
            WatchdogMode::Unleash => ClockEventState::Watchdog,
            WatchdogMode::Leash => ClockEventState::Shutdown,
        });
        Ok(())
    }

    pub fn set_handler(&self, handler: impl Fn() + Send + 'static) {
        *self.handler.lock() = Some(Box::new(handler));
    }

    /// Invoked from the device's event callback when it fires without
    /// having been fed in time — the watchdog "barks".
    pub fn bark(&self) {
        if let Some(h) = self.handler.lock().as_ref() {
            h();
        }
    }

    /// Arms (or re-arms) the watchdog for `nanoseconds`. Returns `true` if
    /// the requested timeout needed clamping to the device's range.
    pub fn feed(&self, nanoseconds: u32) -> crate::Result<bool> {
        let dev = self.device.lock().ok_or(crate::KernelError::NoDevice)?;
        self.fed_once.store(true, core::sync::atomic::Ordering::Relaxed);
        Ok(dev.program_timeout_ns(nanoseconds))
    }

    pub fn has_been_fed(&self) -> bool {
        self.fed_once.load(core::sync::atomic::Ordering::Relaxed)
    }
}

impl Default for WatchdogSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::clockevent::ClockEventDriver;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct NullDriver;
    impl ClockEventDriver for NullDriver {
        fn set_next_event(&self, _ticks: u32, _state: ClockEventState) {}
        fn set_state(&self, _state: ClockEventState) {}
    }
    static DRIVER: NullDriver = NullDriver;

    fn wd_device() -> &'static ClockEventDevice {
        Box::leak(Box::new(ClockEventDevice::new("wd", ClockEventFeatures::WATCHDOG, 10, 9, 100, 1_000_000, 1, &DRIVER)))
    }

    #[test]
    fn feed_without_device_reports_no_device() {
        let wd = WatchdogSubsystem::new();
        assert!(wd.feed(1000).is_err());
    }

    #[test]
    fn feed_after_device_offered_succeeds() {
        let wd = WatchdogSubsystem::new();
        wd.check_device(wd_device());
        assert!(wd.feed(1000).is_ok());
        assert!(wd.has_been_fed());
    }

    #[test]
    fn non_watchdog_device_is_rejected() {
        let wd = WatchdogSubsystem::new();
        let dev = Box::leak(Box::new(ClockEventDevice::new("t", ClockEventFeatures::PERIODIC, 1, 8, 100, 1_000_000, 1, &DRIVER)));
        wd.check_device(dev);
        assert!(wd.device().is_none());
    }

    #[test]
    fn bark_invokes_registered_handler() {
        let wd = WatchdogSubsystem::new();
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        wd.set_handler(|| {
            CALLS.fetch_add(1, Ordering::SeqCst);
        });
        wd.bark();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
