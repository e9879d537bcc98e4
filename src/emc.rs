// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! External memory controller registers.
//!
//! The EMC has a broadcast block, whose writes go to both channels, and one block per channel
//! whose status registers report that channel alone.

/// Offset of `EMC_STATUS`, the same in the broadcast and channel blocks.
const EMC_STATUS: usize = 0x2B4;

bitflags::bitflags! {
    /// Bits of `EMC_STATUS`.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct EmcStatus: u32 {
        /// The first DRAM device is in self-refresh.
        const DRAM_DEV0_IN_SELF_REFRESH = 1 << 8;
        /// The second DRAM device is in self-refresh.
        const DRAM_DEV1_IN_SELF_REFRESH = 1 << 9;
    }
}

/// One EMC register block.
#[derive(Debug)]
pub struct Emc {
    base: *mut u32,
}

impl Emc {
    /// Creates a driver for the EMC register block at the given address.
    ///
    /// # Safety
    ///
    /// `base` must point to an EMC register block of 0x1000 bytes, mapped as device memory, and must
    /// remain valid for the lifetime of the returned driver.
    pub const unsafe fn new(base: *mut u32) -> Self {
        Self { base }
    }

    /// Reads `EMC_STATUS`.
    pub fn status(&self) -> EmcStatus {
        // SAFETY: `base` points to an EMC block, as promised by the caller of `new`, and
        // `EMC_STATUS` is within it.
        let status = unsafe { self.base.byte_add(EMC_STATUS).read_volatile() };
        EmcStatus::from_bits_retain(status)
    }

    /// Returns whether both DRAM devices behind this block are in self-refresh.
    pub fn dram_in_self_refresh(&self) -> bool {
        self.status().contains(
            EmcStatus::DRAM_DEV0_IN_SELF_REFRESH | EmcStatus::DRAM_DEV1_IN_SELF_REFRESH,
        )
    }
}

// SAFETY: `Emc` is only a pointer to device memory, which can be accessed from any core.
unsafe impl Send for Emc {}
