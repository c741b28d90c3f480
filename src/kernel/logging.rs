//! `log` façade over an injected console, grounded on
//! `vanadinite/src/io/logging.rs`'s `Logger`/`init_logging` shape — minus
//! the hart-id/cycle-counter timestamp prefix and ANSI coloring, which are
//! board bring-up concerns outside this crate. The verbosity ceiling is
//! `config::kernel_level()` rather than a separate `log::LevelFilter`
//! static, so `printk`-style verbosity changes at runtime (§6) take effect
//! without re-registering the logger.

use crate::config::{kernel_level, KernelLevel};
use crate::sync::Mutex;
use core::fmt::Write as _;

/// A target the logger writes formatted records to. Implemented once by
/// board bring-up code over a UART or similar, the way the teacher's
/// `ConsoleDevice` trait is implemented per-driver.
pub trait Console: Send + Sync {
    fn write_str(&self, s: &str);
}

static CONSOLE: Mutex<Option<&'static dyn Console>> = Mutex::new(None);

pub fn register_console(console: &'static dyn Console) {
    *CONSOLE.lock() = Some(console);
}

fn level_permits(level: log::Level) -> bool {
    let ceiling = match kernel_level() {
        KernelLevel::Emerg | KernelLevel::Crit | KernelLevel::Err => log::Level::Error,
        KernelLevel::Warn => log::Level::Warn,
        KernelLevel::Info => log::Level::Info,
        KernelLevel::Debug => log::Level::Trace,
    };
    level <= ceiling
}

struct ConsoleWriter<'a>(&'a dyn Console);

impl core::fmt::Write for ConsoleWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        level_permits(metadata.level())
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(console) = *CONSOLE.lock() {
            let _ = write!(ConsoleWriter(console), "[{:>5}] [{}] {}\n", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: Logger = Logger;

/// Installs the kernel logger as the `log` crate's global sink. Safe to
/// call once during boot, before or after [`register_console`] — records
/// logged before a console is registered are silently dropped.
pub fn init() -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    struct Captured(Mutex<String>);
    impl Console for Captured {
        fn write_str(&self, s: &str) {
            self.0.lock().push_str(s);
        }
    }

    #[test]
    fn level_permits_respects_kernel_level() {
        crate::config::set_kernel_level(KernelLevel::Warn);
        assert!(level_permits(log::Level::Error));
        assert!(level_permits(log::Level::Warn));
        assert!(!level_permits(log::Level::Info));
        crate::config::set_kernel_level(KernelLevel::Info);
    }

    #[test]
    fn console_writer_forwards_formatted_text() {
        let console = Captured(Mutex::new(String::new()));
        let mut w = ConsoleWriter(&console);
        write!(w, "hello {}", 42).unwrap();
        assert_eq!(*console.0.lock(), "hello 42");
    }
}
