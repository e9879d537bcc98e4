// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Placement of the per-core stacks in TZRAM.
//!
//! Cores 0 to 2 share one TZRAM page, with 0x400 bytes each and the last 0x400 bytes reserved as
//! the power-down stack. Core 3 owns a whole page. The cold boot runs on the first half of core 3's
//! page, before the MMU is on.

use crate::{memory_map::TzramSegment, power::CORE_COUNT};
#[cfg(all(target_arch = "aarch64", not(test)))]
use core::ffi::c_void;

/// The number of bytes of stack for each of cores 0 to 2.
pub const CORE_STACK_SIZE: usize = 0x400;

/// Top of the stack used while a core which shares the stack page powers itself down.
pub const POWERDOWN_STACK_TOP: usize =
    TzramSegment::Core012Stacks.virtual_address() + TzramSegment::Core012Stacks.size();

/// Top of the stack used by the cold boot, which runs from physical addresses.
pub const COLDBOOT_STACK_TOP: usize = TzramSegment::Core3Stack.physical_address() + 0x800;

const _: () = assert!((CORE_COUNT - 1) * CORE_STACK_SIZE < TzramSegment::Core012Stacks.size());

/// Returns the initial stack pointer of the given core, once the MMU is on.
pub const fn core_stack_top(core: usize) -> usize {
    if core == CORE_COUNT - 1 {
        TzramSegment::Core3Stack.virtual_address() + TzramSegment::Core3Stack.size()
    } else {
        TzramSegment::Core012Stacks.virtual_address() + CORE_STACK_SIZE * (core + 1)
    }
}

/// Switches the stack pointer to `stack_top` and calls `f(arg)` on the new stack.
///
/// # Safety
///
/// `stack_top` must be the top of a mapped, writable stack which nothing else is using, and `f`
/// must be safe to call with `arg`.
#[cfg(all(target_arch = "aarch64", not(test)))]
#[unsafe(naked)]
pub unsafe extern "C" fn call_with_stack_pointer(
    stack_top: usize,
    f: unsafe extern "C" fn(*mut c_void) -> !,
    arg: *mut c_void,
) -> ! {
    crate::naked_asm!(
        "mov	sp, x0
        mov	x0, x2
        blr	x1
        b	."
    )
}
