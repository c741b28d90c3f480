//! Time and clock-event subsystem (§4.4): a per-CPU tick device with
//! periodic/one-shot/watchdog modes driving scheduler wakeups.

pub mod clockevent;
pub mod tick;
pub mod watchdog;

pub use clockevent::{ClockEventDevice, ClockEventDriver, ClockEventFeatures, ClockEventState};
pub use tick::{TickMode, TickSubsystem};
pub use watchdog::{WatchdogMode, WatchdogSubsystem};
