// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

use core::ops::Range;

pub fn warmboot_crt0_load() -> Range<usize> {
    0x4002_0000..0x4002_0800
}

pub fn pk2ldr_load() -> Range<usize> {
    0x4002_0800..0x4002_1800
}

pub fn main_load() -> Range<usize> {
    0x4002_1800..0x4002_4000
}

pub fn vectors_load() -> Range<usize> {
    0x4002_4000..0x4002_4700
}
