// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Helper functions to get addresses defined by the linker script.

use core::ops::Range;

unsafe extern "C" {
    // These aren't really variables, just symbols defined by the linker script whose addresses we
    // need to get. They should never be read or written.
    static __WARMBOOT_CRT0_LMA_START__: u32;
    static __WARMBOOT_CRT0_LMA_END__: u32;
    static __PK2LDR_LMA_START__: u32;
    static __PK2LDR_LMA_END__: u32;
    static __MAIN_LMA_START__: u32;
    static __MAIN_LMA_END__: u32;
    static __VECTORS_LMA_START__: u32;
    static __VECTORS_LMA_END__: u32;
}

/// Returns the load address range of the warm-boot entry code.
pub fn warmboot_crt0_load() -> Range<usize> {
    (&raw const __WARMBOOT_CRT0_LMA_START__) as usize..(&raw const __WARMBOOT_CRT0_LMA_END__) as usize
}

/// Returns the load address range of the package2 loader.
pub fn pk2ldr_load() -> Range<usize> {
    (&raw const __PK2LDR_LMA_START__) as usize..(&raw const __PK2LDR_LMA_END__) as usize
}

/// Returns the load address range of the main monitor data.
pub fn main_load() -> Range<usize> {
    (&raw const __MAIN_LMA_START__) as usize..(&raw const __MAIN_LMA_END__) as usize
}

/// Returns the load address range of the exception vectors.
pub fn vectors_load() -> Range<usize> {
    (&raw const __VECTORS_LMA_START__) as usize..(&raw const __VECTORS_LMA_END__) as usize
}
