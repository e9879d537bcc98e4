// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Microsecond delays based on the TIMERUS free-running counter, and bounded polling.

use thiserror::Error;

/// Something which can busy-wait for a number of microseconds.
pub trait Delay {
    /// Waits for at least `us` microseconds.
    fn wait_us(&self, us: u32);
}

impl<T: Delay + ?Sized> Delay for &T {
    fn wait_us(&self, us: u32) {
        (**self).wait_us(us);
    }
}

/// A polled condition did not become true within its budget.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("Polling budget exhausted")]
pub struct Timeout;

/// Evaluates `condition` up to `budget` times, waiting `interval_us` after each failed attempt.
///
/// Returns `Ok` as soon as the condition holds, or [`Timeout`] once the budget is exhausted.
pub fn poll_with_budget(
    delay: &impl Delay,
    budget: u32,
    interval_us: u32,
    mut condition: impl FnMut() -> bool,
) -> Result<(), Timeout> {
    for _ in 0..budget {
        if condition() {
            return Ok(());
        }
        delay.wait_us(interval_us);
    }
    Err(Timeout)
}

/// The TIMERUS registers at the start of the timers block.
#[repr(C)]
pub struct TimerusRegisters {
    _reserved: [u32; 4],
    /// Microsecond counter, incremented once per microsecond.
    cntr_1us: u32,
}

/// Driver for the TIMERUS microsecond counter.
#[derive(Debug)]
pub struct Timerus {
    registers: *mut TimerusRegisters,
}

impl Timerus {
    /// Creates a new driver for the TIMERUS block at the given base address.
    ///
    /// # Safety
    ///
    /// `registers` must point to the timers block, mapped as device memory, and must remain valid
    /// for the lifetime of the returned driver. Reading the counter has no side effects, so several
    /// instances may alias the same block.
    pub const unsafe fn new(registers: *mut TimerusRegisters) -> Self {
        Self { registers }
    }

    /// Returns the current value of the microsecond counter.
    pub fn now_us(&self) -> u32 {
        // SAFETY: `registers` points to a valid TIMERUS block, as promised by the caller of `new`.
        unsafe { (&raw const (*self.registers).cntr_1us).read_volatile() }
    }
}

impl Delay for Timerus {
    fn wait_us(&self, us: u32) {
        let start = self.now_us();
        while self.now_us().wrapping_sub(start) <= us {}
    }
}

// SAFETY: `Timerus` only reads the counter register, which is safe from any core.
unsafe impl Send for Timerus {}
// SAFETY: See above.
unsafe impl Sync for Timerus {}
