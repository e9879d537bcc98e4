// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Driver for the per-core registers of the flow controller.

/// The flow controller registers, from the start of the block.
#[repr(C)]
pub struct FlowControllerRegisters {
    halt_cpu0_events: u32,
    _halt_cop_events: u32,
    cpu0_csr: u32,
    _reserved0: [u32; 2],
    halt_cpu1_events: u32,
    cpu1_csr: u32,
    halt_cpu2_events: u32,
    cpu2_csr: u32,
    halt_cpu3_events: u32,
    cpu3_csr: u32,
    _reserved1: [u32; 16],
    cc4_core_ctrl: [u32; 4],
}

/// Driver for the flow controller.
#[derive(Debug)]
pub struct FlowController {
    registers: *mut FlowControllerRegisters,
}

impl FlowController {
    /// Creates a new flow controller driver for the register block at the given address.
    ///
    /// # Safety
    ///
    /// `registers` must point to the flow controller register block, mapped as device memory, and
    /// must remain valid for the lifetime of the returned driver. No other driver may access the
    /// same registers at the same time.
    pub const unsafe fn new(registers: *mut FlowControllerRegisters) -> Self {
        Self { registers }
    }

    fn cpu_csr(&self, core: usize) -> *mut u32 {
        let registers = self.registers;
        // SAFETY: `registers` points to a valid register block, so projecting a field is in bounds.
        unsafe {
            match core {
                0 => &raw mut (*registers).cpu0_csr,
                1 => &raw mut (*registers).cpu1_csr,
                2 => &raw mut (*registers).cpu2_csr,
                3 => &raw mut (*registers).cpu3_csr,
                _ => panic!("Invalid core {core}"),
            }
        }
    }

    fn halt_cpu_events(&self, core: usize) -> *mut u32 {
        let registers = self.registers;
        // SAFETY: `registers` points to a valid register block, so projecting a field is in bounds.
        unsafe {
            match core {
                0 => &raw mut (*registers).halt_cpu0_events,
                1 => &raw mut (*registers).halt_cpu1_events,
                2 => &raw mut (*registers).halt_cpu2_events,
                3 => &raw mut (*registers).halt_cpu3_events,
                _ => panic!("Invalid core {core}"),
            }
        }
    }

    /// Writes the control and status register of the given core.
    pub fn set_cpu_csr(&mut self, core: usize, value: u32) {
        // SAFETY: The pointer is to a valid register, as promised by the caller of `new`.
        unsafe { self.cpu_csr(core).write_volatile(value) }
    }

    /// Writes the halt events register of the given core.
    pub fn set_halt_cpu_events(&mut self, core: usize, value: u32) {
        // SAFETY: The pointer is to a valid register, as promised by the caller of `new`.
        unsafe { self.halt_cpu_events(core).write_volatile(value) }
    }

    /// Writes the CC4 control register of the given core.
    pub fn set_cc4_core_ctrl(&mut self, core: usize, value: u32) {
        assert!(core < 4, "Invalid core {core}");
        // SAFETY: `registers` points to a valid register block, as promised by the caller of `new`,
        // and `core` is within the bounds of the array.
        unsafe { (&raw mut (*self.registers).cc4_core_ctrl[core]).write_volatile(value) }
    }

    /// Clears the control and status register and the halt events of the given core.
    pub fn clear_csr_and_events(&mut self, core: usize) {
        self.set_cpu_csr(core, 0);
        self.set_halt_cpu_events(core, 0);
    }
}

// SAFETY: `FlowController` is only a pointer to device memory, which can be accessed from any core.
unsafe impl Send for FlowController {}
