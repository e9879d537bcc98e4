// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Data and instruction cache maintenance for the secure monitor's own memory.

use crate::aarch64::{dsb_sy, isb};
use arm_sysregs::{
    CacheLevel, CacheType, CcsidrEl1, CsselrEl1, read_ccsidr_el1, read_clidr_el1, read_ctr_el0,
    write_csselr_el1,
};
#[cfg(all(target_arch = "aarch64", not(test)))]
use core::arch::asm;

/// Cleans and invalidates `size` bytes starting at `addr` from the data cache, to the point of
/// coherency.
pub fn flush_dcache_range(addr: usize, size: usize) {
    let line_size = dcache_line_size();
    let mut line = addr & !(line_size - 1);
    while line < addr + size {
        clean_invalidate_va(line);
        line += line_size;
    }
    dsb_sy();
}

/// Cleans and invalidates every data cache level up to the level of coherency, by set/way.
pub fn flush_dcache_all() {
    let clidr = read_clidr_el1();
    for level in 1..=clidr.loc() {
        let level = CacheLevel::new(level);
        if matches!(
            clidr.cache_type(level),
            CacheType::NoCache | CacheType::InstructionOnly
        ) {
            continue;
        }
        write_csselr_el1(CsselrEl1::new(false, level, false));
        isb();
        for operand in set_way_operands(level, read_ccsidr_el1()) {
            clean_invalidate_set_way(operand);
        }
    }
    dsb_sy();
    isb();
}

/// Invalidates the whole instruction cache to the point of unification.
pub fn invalidate_icache_all() {
    #[cfg(all(target_arch = "aarch64", not(test)))]
    // SAFETY: Invalidating the instruction cache does not change memory contents.
    unsafe {
        asm!("ic iallu", options(nostack, preserves_flags));
    }
    dsb_sy();
    isb();
}

/// Returns the `DC CISW` operands covering every line of the given cache level, as described by
/// its `CCSIDR_EL1`.
fn set_way_operands(level: CacheLevel, ccsidr: CcsidrEl1) -> impl Iterator<Item = u64> {
    // Associativity and set count in their layout without FEAT_CCIDX.
    let ways = ((ccsidr.bits() >> 3) & 0x3FF) + 1;
    let sets = ((ccsidr.bits() >> 13) & 0x7FFF) + 1;
    let line_shift = u64::from(ccsidr.linesize()) + 4;
    let way_shift = ((ways - 1) as u32).leading_zeros();
    let level_field = u64::from(level) << 1;

    (0..ways).flat_map(move |way| {
        (0..sets).map(move |set| (way << way_shift) | (set << line_shift) | level_field)
    })
}

fn dcache_line_size() -> usize {
    4 << read_ctr_el0().dminline()
}

fn clean_invalidate_va(address: usize) {
    #[cfg(all(target_arch = "aarch64", not(test)))]
    // SAFETY: Cleaning and invalidating a cache line by VA does not change memory contents.
    unsafe {
        asm!("dc civac, {}", in(reg) address, options(nostack, preserves_flags));
    }
    #[cfg(not(all(target_arch = "aarch64", not(test))))]
    let _ = address;
}

fn clean_invalidate_set_way(operand: u64) {
    #[cfg(all(target_arch = "aarch64", not(test)))]
    // SAFETY: Cleaning and invalidating by set/way writes dirty lines back to memory and does not
    // change memory contents.
    unsafe {
        asm!("dc cisw, {}", in(reg) operand, options(nostack, preserves_flags));
    }
    #[cfg(not(all(target_arch = "aarch64", not(test))))]
    let _ = operand;
}
