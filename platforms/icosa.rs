// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

use super::Builder;

pub struct IcosaBuilder;

impl IcosaBuilder {
    pub const PLAT_NAME: &str = "icosa";

    /// iRAM C, where the bootloader loads the monitor.
    const LOAD_BASE: u64 = 0x4002_0000;
    const LOAD_SIZE: u64 = 0x2_0000;
    const TZRAM_BASE: u64 = 0x7C01_0000;
}

impl Builder for IcosaBuilder {
    fn load_base(&self) -> u64 {
        Self::LOAD_BASE
    }

    fn load_size(&self) -> u64 {
        Self::LOAD_SIZE
    }

    fn tzram_base(&self) -> u64 {
        Self::TZRAM_BASE
    }
}
