// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Driver for the 16550-compatible UARTs of the Tegra X1, used for the log console.
//!
//! The baud rate and line settings are left as the bootloader configured them.

use bitflags::bitflags;
use core::fmt;

bitflags! {
    /// Line status register bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct LineStatus: u32 {
        /// Receive data ready.
        const DATA_READY = 1 << 0;
        /// Overrun error.
        const OVERRUN = 1 << 1;
        /// Transmit holding register empty.
        const THR_EMPTY = 1 << 5;
        /// Transmitter idle.
        const TRANSMITTER_EMPTY = 1 << 6;
    }
}

/// The 16550 register block, with registers on a 4-byte stride.
#[repr(C)]
pub struct UartRegisters {
    /// Transmit holding register, or receive buffer register on read.
    thr: u32,
    /// IER, FCR, LCR and MCR, which are left as the bootloader set them.
    _reserved: [u32; 4],
    lsr: u32,
}

/// A UART used only for output.
#[derive(Debug)]
pub struct Uart {
    registers: *mut UartRegisters,
}

impl Uart {
    /// Creates a new driver for the UART at the given address.
    ///
    /// # Safety
    ///
    /// `registers` must point to a 16550 register block mapped as device memory, which nothing else
    /// writes to for the lifetime of the returned driver.
    pub const unsafe fn new(registers: *mut UartRegisters) -> Self {
        Self { registers }
    }

    fn line_status(&self) -> LineStatus {
        // SAFETY: `registers` points to a valid UART, as promised by the caller of `new`.
        LineStatus::from_bits_retain(unsafe { (&raw const (*self.registers).lsr).read_volatile() })
    }

    /// Writes a single byte, waiting for space in the transmit holding register.
    pub fn write_byte(&mut self, byte: u8) {
        while !self.line_status().contains(LineStatus::THR_EMPTY) {
            core::hint::spin_loop();
        }
        // SAFETY: `registers` points to a valid UART, as promised by the caller of `new`.
        unsafe { (&raw mut (*self.registers).thr).write_volatile(byte.into()) }
    }

    /// Waits until everything written has left the transmitter.
    pub fn flush(&self) {
        while !self.line_status().contains(LineStatus::TRANSMITTER_EMPTY) {
            core::hint::spin_loop();
        }
    }
}

impl fmt::Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

// SAFETY: `Uart` is only a pointer to device memory, which can be accessed from any core.
unsafe impl Send for Uart {}
