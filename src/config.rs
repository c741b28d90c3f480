//! Build-time configuration surface (§6).
//!
//! The original exposes these as `CONFIG_*` macros threaded through a
//! generated `autoconf.h`. Rust has no equivalent preprocessor step that the
//! rest of the pack reaches for, so they are plain associated constants
//! instead; a board-support crate overrides them by depending on this crate
//! with different values compiled in, or (for the handful that plausibly
//! vary at runtime on the same binary, like the printk level) by reading the
//! corresponding `static` through [`set_kernel_level`].

use core::sync::atomic::{AtomicU8, Ordering};

/// Default kernel stack size in bytes for a spawned task.
pub const STACK_SIZE: usize = 64 * 1024;

/// Upper bound on the number of CPUs this core will schedule across.
pub const SMP_CPUS_MAX: usize = 4;

/// Virtual/physical offset applied to identity-mapped kernel addresses.
pub const PAGE_OFFSET: usize = 0xF000_0000;

/// Number of pages backing a kernel stack (`STACK_SIZE` rounded up to pages).
pub const KERNEL_STACK_PAGES: usize = STACK_SIZE.div_ceil(PAGE_SIZE);

/// Nominal CPU clock frequency in Hz, used to derive tick periods.
pub const CPU_CLOCK_FREQ: u64 = 100_000_000;

/// Depth of the NoC DMA transfer queue shared by the Xentium engine.
pub const NOC_DMA_TRANSFER_QUEUE_SIZE: usize = 16;

/// Free-page threshold below which [`crate::mem::page_map::PageMap`] rotates
/// a node to the back of its search order.
pub const PAGE_MAP_MOVE_NODE_AVAIL_THRESH: usize = 4;

/// Page granularity used throughout the memory subsystem.
pub const PAGE_SIZE: usize = 4096;

static KERNEL_LEVEL: AtomicU8 = AtomicU8::new(KernelLevel::Info as u8);

/// `printk` verbosity levels, coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum KernelLevel {
    Emerg = 0,
    Crit = 1,
    Err = 2,
    Warn = 3,
    Info = 4,
    Debug = 5,
}

pub fn kernel_level() -> KernelLevel {
    match KERNEL_LEVEL.load(Ordering::Relaxed) {
        0 => KernelLevel::Emerg,
        1 => KernelLevel::Crit,
        2 => KernelLevel::Err,
        3 => KernelLevel::Warn,
        4 => KernelLevel::Info,
        _ => KernelLevel::Debug,
    }
}

pub fn set_kernel_level(level: KernelLevel) {
    KERNEL_LEVEL.store(level as u8, Ordering::Relaxed);
}
