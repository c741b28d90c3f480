//! Post-mortem exchange area (§6): a fixed 72-byte struct at a configured
//! physical address that `panic`/`die` writes before halting the CPU, so a
//! ground-side tool can read back the last known state.
//!
//! No original-source file defines this struct (it is absent from the
//! pack), so the byte layout is grounded directly on §6's field list, kept
//! in the order it is written there. The field sizes as given sum to 64
//! bytes before the stacktrace entry, leaving exactly 8 bytes for it against
//! the struct's own stated 72-byte total — at odds with the "7 words × 2"
//! sizing given for that field. Lacking a source to check against, this is
//! resolved in favor of the explicit 72-byte total: one 4-byte
//! last-return-address word per CPU (see the Open Question note in
//! `DESIGN.md`).
//!
//! Every multi-byte field is encoded/decoded explicitly rather than via a
//! `#[repr(C)]` transmute, both because the struct mixes byte orders (the
//! CUC reset-time is big-endian per convention, everything else
//! little-endian) and because transmuting a struct onto a fixed physical
//! address is exactly the kind of unsafety this crate's allocators already
//! avoid by staying bookkeeping-only.

use static_assertions::const_assert_eq;

pub const EXCHANGE_AREA_SIZE: usize = 72;

const CPU_COUNT: usize = 2;
const REGS_PER_CPU: usize = 5;

/// CCSDS-style CUC (coarse/fine) timestamp: 4-byte coarse seconds, 3-byte
/// fractional microseconds, 1 reserved byte. Encoded big-endian throughout,
/// per the convention the format is named for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CucTime {
    pub coarse_seconds: u32,
    pub fraction_us: u32,
}

impl CucTime {
    const SIZE: usize = 8;

    fn write(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.coarse_seconds.to_be_bytes());
        let frac = self.fraction_us.to_be_bytes();
        out[4..7].copy_from_slice(&frac[1..4]);
        out[7] = 0;
    }

    fn read(bytes: &[u8]) -> Self {
        let coarse_seconds = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let mut frac = [0u8; 4];
        frac[1..4].copy_from_slice(&bytes[4..7]);
        let fraction_us = u32::from_be_bytes(frac);
        Self { coarse_seconds, fraction_us }
    }
}

/// The post-mortem exchange area written by the panic/die path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeArea {
    pub reset_type: u16,
    pub error_count: u8,
    pub reset_cnt: u8,
    pub reset_time: CucTime,
    /// Trap number that caused the reset, one slot per CPU.
    pub trap_number: [u8; CPU_COUNT],
    pub software_trap_id: u16,
    /// Register snapshot, 5 registers per CPU.
    pub registers: [[u32; REGS_PER_CPU]; CPU_COUNT],
    pub ahb_status: u32,
    pub ahb_failing_address: u32,
    /// Last known return address per CPU at the point of reset.
    pub stacktrace: [u32; CPU_COUNT],
}

impl Default for ExchangeArea {
    fn default() -> Self {
        Self {
            reset_type: 0,
            error_count: 0,
            reset_cnt: 0,
            reset_time: CucTime::default(),
            trap_number: [0; CPU_COUNT],
            software_trap_id: 0,
            registers: [[0; REGS_PER_CPU]; CPU_COUNT],
            ahb_status: 0,
            ahb_failing_address: 0,
            stacktrace: [0; CPU_COUNT],
        }
    }
}

impl ExchangeArea {
    pub fn to_bytes(&self) -> [u8; EXCHANGE_AREA_SIZE] {
        let mut out = [0u8; EXCHANGE_AREA_SIZE];
        let mut off = 0;

        out[off..off + 2].copy_from_slice(&self.reset_type.to_le_bytes());
        off += 2;
        out[off] = self.error_count;
        off += 1;
        out[off] = self.reset_cnt;
        off += 1;
        self.reset_time.write(&mut out[off..off + CucTime::SIZE]);
        off += CucTime::SIZE;
        out[off..off + CPU_COUNT].copy_from_slice(&self.trap_number);
        off += CPU_COUNT;
        out[off..off + 2].copy_from_slice(&self.software_trap_id.to_le_bytes());
        off += 2;
        for cpu in &self.registers {
            for reg in cpu {
                out[off..off + 4].copy_from_slice(&reg.to_le_bytes());
                off += 4;
            }
        }
        out[off..off + 4].copy_from_slice(&self.ahb_status.to_le_bytes());
        off += 4;
        out[off..off + 4].copy_from_slice(&self.ahb_failing_address.to_le_bytes());
        off += 4;
        for pc in &self.stacktrace {
            out[off..off + 4].copy_from_slice(&pc.to_le_bytes());
            off += 4;
        }

        debug_assert_eq!(off, EXCHANGE_AREA_SIZE);
        out
    }

    pub fn from_bytes(bytes: &[u8; EXCHANGE_AREA_SIZE]) -> Self {
        let mut off = 0;

        let reset_type = u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap());
        off += 2;
        let error_count = bytes[off];
        off += 1;
        let reset_cnt = bytes[off];
        off += 1;
        let reset_time = CucTime::read(&bytes[off..off + CucTime::SIZE]);
        off += CucTime::SIZE;
        let mut trap_number = [0u8; CPU_COUNT];
        trap_number.copy_from_slice(&bytes[off..off + CPU_COUNT]);
        off += CPU_COUNT;
        let software_trap_id = u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap());
        off += 2;
        let mut registers = [[0u32; REGS_PER_CPU]; CPU_COUNT];
        for cpu in &mut registers {
            for reg in cpu {
                *reg = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
                off += 4;
            }
        }
        let ahb_status = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let ahb_failing_address = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let mut stacktrace = [0u32; CPU_COUNT];
        for pc in &mut stacktrace {
            *pc = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
            off += 4;
        }

        debug_assert_eq!(off, EXCHANGE_AREA_SIZE);
        Self { reset_type, error_count, reset_cnt, reset_time, trap_number, software_trap_id, registers, ahb_status, ahb_failing_address, stacktrace }
    }
}

const_assert_eq!(EXCHANGE_AREA_SIZE, 72);
