// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

#[cfg(target_arch = "aarch64")]
use core::arch::asm;

/// Issues a data synchronization barrier (`dsb`) instruction that applies to the full system
/// (`sy`).
pub fn dsb_sy() {
    // SAFETY: `dsb` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("dsb sy", options(nostack));
    }
}

/// Issues an instruction synchronization barrier (`isb`) instruction.
pub fn isb() {
    // SAFETY: `isb` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("isb", options(nostack));
    }
}

/// Waits for an interrupt.
pub fn wfi() {
    // SAFETY: `wfi` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("wfi", options(nomem, nostack, preserves_flags));
    }
}

/// Translates the given EL3 virtual address to a physical address with an `at s1e3r` lookup.
///
/// Returns `None` if the address is not mapped. Without a running MMU (or on the host) the
/// address is returned unchanged.
pub fn virtual_to_physical(va: usize) -> Option<usize> {
    #[cfg(all(target_arch = "aarch64", not(test)))]
    {
        use arm_sysregs::{ParEl1, read_par_el1};

        // SAFETY: `at` only updates PAR_EL1, which is not used by Rust code.
        unsafe {
            asm!(
                "at s1e3r, {va}",
                "isb",
                va = in(reg) va,
                options(nostack, preserves_flags),
            );
        }
        let par = read_par_el1();
        if par.contains(ParEl1::F) {
            return None;
        }
        Some(((par.bits() & 0x000F_FFFF_FFFF_F000) as usize) | (va & 0xFFF))
    }
    #[cfg(not(all(target_arch = "aarch64", not(test))))]
    {
        Some(va)
    }
}
