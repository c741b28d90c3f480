//! Syscall table dispatch (§6).
//!
//! Grounded on `original_source/libc/src/asm-generic/unistd.h`'s `__NR_*`
//! slot numbering (`__NR_syscalls = 16`) and `include/kernel/syscalls.h`'s
//! argument-marshalling macros, which this crate has no use for since Rust
//! functions are already typed at the call site — only the slot table and
//! the negative-errno return convention carry over.

use crate::{KernelError, Result};

pub const NR_SYSCALLS: usize = 16;

/// Syscall slot numbers, `__NR_*` in the grounding source. `SchedProgSeg`
/// onward are assigned the next free slots; the header only hard-codes up
/// through `sched_prog_seg`, with `sysctl_show_attr`/`sysctl_store_attr`
/// named by §6's slot list but left unnumbered in the surviving source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SyscallNr {
    Read = 0,
    Write = 1,
    Alloc = 2,
    Free = 3,
    GetTime = 4,
    NanoSleep = 5,
    GrSpw2 = 6,
    ThreadCreate = 7,
    SchedYield = 8,
    Watchdog = 9,
    SchedProgSeg = 10,
    SysctlShowAttr = 11,
    SysctlStoreAttr = 12,
}

impl TryFrom<usize> for SyscallNr {
    type Error = KernelError;

    fn try_from(nr: usize) -> Result<Self> {
        Ok(match nr {
            0 => Self::Read,
            1 => Self::Write,
            2 => Self::Alloc,
            3 => Self::Free,
            4 => Self::GetTime,
            5 => Self::NanoSleep,
            6 => Self::GrSpw2,
            7 => Self::ThreadCreate,
            8 => Self::SchedYield,
            9 => Self::Watchdog,
            10 => Self::SchedProgSeg,
            11 => Self::SysctlShowAttr,
            12 => Self::SysctlStoreAttr,
            _ => return Err(KernelError::InvalidArgument),
        })
    }
}

/// Up to six single-word arguments, per §6's calling convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallArgs(pub [usize; 6]);

pub type SyscallHandler = fn(&SyscallArgs) -> Result<isize>;

/// A fixed 16-slot syscall vector. Unregistered slots, and slot numbers
/// beyond `NR_SYSCALLS`, both fail with the errno a real syscall ABI would
/// use for an unimplemented or out-of-range number.
pub struct SyscallTable {
    slots: [Option<SyscallHandler>; NR_SYSCALLS],
}

impl SyscallTable {
    pub const fn new() -> Self {
        Self { slots: [None; NR_SYSCALLS] }
    }

    pub fn register(&mut self, nr: SyscallNr, handler: SyscallHandler) {
        self.slots[nr as usize] = Some(handler);
    }

    /// Dispatches syscall `nr` with `args`, returning the syscall ABI's
    /// single-word result: non-negative on success, `-errno` on failure.
    pub fn dispatch(&self, nr: usize, args: &SyscallArgs) -> isize {
        let Some(slot) = self.slots.get(nr) else {
            return KernelError::InvalidArgument.to_syscall_ret();
        };
        match slot {
            None => KernelError::NotSupported.to_syscall_ret(),
            Some(handler) => match handler(args) {
                Ok(ret) => ret,
                Err(e) => e.to_syscall_ret(),
            },
        }
    }
}

impl Default for SyscallTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_one(_: &SyscallArgs) -> Result<isize> {
        Ok(1)
    }

    fn always_fails(_: &SyscallArgs) -> Result<isize> {
        Err(KernelError::InvalidArgument)
    }

    #[test]
    fn unregistered_slot_reports_not_supported() {
        let table = SyscallTable::new();
        assert_eq!(table.dispatch(SyscallNr::Read as usize, &SyscallArgs::default()), KernelError::NotSupported.to_syscall_ret());
    }

    #[test]
    fn out_of_range_slot_reports_invalid_argument() {
        let table = SyscallTable::new();
        assert_eq!(table.dispatch(100, &SyscallArgs::default()), KernelError::InvalidArgument.to_syscall_ret());
    }

    #[test]
    fn registered_handler_return_value_passes_through() {
        let mut table = SyscallTable::new();
        table.register(SyscallNr::SchedYield, ok_one);
        assert_eq!(table.dispatch(SyscallNr::SchedYield as usize, &SyscallArgs::default()), 1);
    }

    #[test]
    fn handler_error_is_converted_to_negative_errno() {
        let mut table = SyscallTable::new();
        table.register(SyscallNr::Watchdog, always_fails);
        assert_eq!(table.dispatch(SyscallNr::Watchdog as usize, &SyscallArgs::default()), KernelError::InvalidArgument.to_syscall_ret());
    }

    #[test]
    fn slot_numbers_match_the_grounding_source() {
        assert_eq!(SyscallNr::Read as usize, 0);
        assert_eq!(SyscallNr::SchedProgSeg as usize, 10);
    }
}
