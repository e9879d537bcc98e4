// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Driver for the power-gate registers of the power management controller.

/// Offset of the PMC registers within the RTC/PMC device window.
pub const PMC_OFFSET: usize = 0x400;

/// Set in `PWRGATE_TOGGLE` to start a toggle; reads back as set until the PMC has accepted it.
pub const PWRGATE_TOGGLE_START: u32 = 0x100;

/// The power partition of a CPU core.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CpuPartition {
    /// Bit of `PWRGATE_STATUS` which is set while the partition is powered.
    pub status_mask: u32,
    /// Partition identifier written to `PWRGATE_TOGGLE`.
    pub toggle_code: u32,
}

/// The power partitions of the four CPU cores, indexed by core.
pub const CPU_PARTITIONS: [CpuPartition; 4] = [
    CpuPartition {
        status_mask: 0x4000,
        toggle_code: 0xE,
    },
    CpuPartition {
        status_mask: 0x200,
        toggle_code: 0x9,
    },
    CpuPartition {
        status_mask: 0x400,
        toggle_code: 0xA,
    },
    CpuPartition {
        status_mask: 0x800,
        toggle_code: 0xB,
    },
];

/// The PMC registers used by the secure monitor, from the start of the PMC block.
#[repr(C)]
pub struct PmcRegisters {
    _reserved0: [u32; 12],
    pwrgate_toggle: u32,
    _reserved1: u32,
    pwrgate_status: u32,
}

/// Driver for the PMC power gates.
#[derive(Debug)]
pub struct Pmc {
    registers: *mut PmcRegisters,
}

impl Pmc {
    /// Creates a new PMC driver for the register block at the given address.
    ///
    /// # Safety
    ///
    /// `registers` must point to the PMC register block, mapped as device memory, and must remain
    /// valid for the lifetime of the returned driver. No other driver may write the power-gate
    /// registers at the same time.
    pub const unsafe fn new(registers: *mut PmcRegisters) -> Self {
        Self { registers }
    }

    /// Reads `PWRGATE_TOGGLE`.
    pub fn pwrgate_toggle(&self) -> u32 {
        // SAFETY: `registers` points to a valid PMC block, as promised by the caller of `new`.
        unsafe { (&raw const (*self.registers).pwrgate_toggle).read_volatile() }
    }

    /// Writes `PWRGATE_TOGGLE`.
    pub fn set_pwrgate_toggle(&mut self, value: u32) {
        // SAFETY: `registers` points to a valid PMC block, as promised by the caller of `new`.
        unsafe { (&raw mut (*self.registers).pwrgate_toggle).write_volatile(value) }
    }

    /// Reads `PWRGATE_STATUS`.
    pub fn pwrgate_status(&self) -> u32 {
        // SAFETY: `registers` points to a valid PMC block, as promised by the caller of `new`.
        unsafe { (&raw const (*self.registers).pwrgate_status).read_volatile() }
    }
}

// SAFETY: `Pmc` is only a pointer to device memory, which can be accessed from any core.
unsafe impl Send for Pmc {}
