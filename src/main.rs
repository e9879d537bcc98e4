// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Secure monitor for the Tegra X1 SoC.

#![cfg_attr(not(test), no_main)]
#![cfg_attr(not(test), no_std)]

mod aarch64;
mod cache;
mod coldboot;
mod debug;
mod emc;
mod flow;
#[cfg_attr(test, path = "layout_fake.rs")]
mod layout;
mod logger;
mod memory_map;
mod pagetable;
mod platform;
mod pmc;
mod power;
// Most driver operations are requested through SMCs, which this image doesn't dispatch.
#[cfg_attr(not(test), allow(dead_code))]
mod se;
mod stacks;
mod timer;
mod uart;

use crate::{
    coldboot::{ColdBootImage, cold_boot},
    memory_map::{L1_TABLE_PHYSICAL_ADDRESS, TzramSegment},
    pagetable::{PageTable, RootTable, TranslationTables},
    platform::{Platform, PlatformImpl},
    power::CoreEntry,
    se::SecurityEngine,
};
use log::{debug, info, warn};

/// Entered from the cold boot stub on the boot core, with the MMU off and `.bss` zeroed.
#[cfg_attr(test, allow(unused))]
extern "C" fn secmon_main() -> ! {
    // SAFETY: The level 1 table sits in the tail of the exception vector segment, and the level 2
    // and level 3 tables in their own TZRAM segments. Nothing else uses that memory, and the MMU is
    // off so physical addresses can be used directly.
    let mut tables = unsafe {
        TranslationTables::new(
            &mut *(L1_TABLE_PHYSICAL_ADDRESS as *mut RootTable),
            &mut *(TzramSegment::L2TranslationTable.physical_address() as *mut PageTable),
            &mut *(TzramSegment::L3TranslationTable.physical_address() as *mut PageTable),
        )
    };

    let power_platform = || {
        // SAFETY: This is the only place the power platform is created, and `cold_boot` only calls
        // this once the MMU is on.
        unsafe { PlatformImpl::power_platform() }
    };
    // SAFETY: The tables are at their final physical addresses, and the image is described by the
    // linker script.
    let coordinator = unsafe {
        cold_boot(
            &mut PlatformImpl::cold_boot_platform(),
            &mut tables,
            &ColdBootImage::from_layout(),
            power_platform,
        )
    }
    .expect("Cold boot failed");

    PlatformImpl::init_logger();
    info!("Tegra secure monitor starting");

    power::install(coordinator);

    // SAFETY: This is the only place the SE driver is created, after the MMU is on.
    let engine = SecurityEngine::new(unsafe { PlatformImpl::se_hardware() });
    if let Err(error) = engine.check_for_error() {
        warn!("Security engine fault left by the bootloader: {error}");
    }
    engine.clear_interrupts();
    if let Err(error) = engine.verify_flags_cleared() {
        warn!("Security engine not idle at boot: {error}");
    }
    se::install(engine);

    let entry = CoreEntry {
        entry_point: PlatformImpl::non_secure_entry_point(),
        argument: 0,
    };
    info!("Entering non-secure world at {:#x}", entry.entry_point);
    enter_lower_el(entry)
}

/// Entered from the warm boot stub on a core which has just been powered on, with the MMU on and
/// the core's own stack.
#[cfg_attr(test, allow(unused))]
extern "C" fn warm_main() -> ! {
    let entry = power::coordinator().handle_core_boot();
    // A completion raised while no core could take the interrupt would otherwise be lost.
    se::security_engine().trigger_interrupt();
    debug!(
        "Warm boot, entering non-secure world at {:#x}",
        entry.entry_point
    );
    enter_lower_el(entry)
}

#[cfg(all(target_arch = "aarch64", not(test)))]
fn enter_lower_el(entry: CoreEntry) -> ! {
    // SAFETY: The entry point was either provided by the platform or requested for this core
    // through the power state coordinator, and nothing in the monitor is borrowed past this point.
    unsafe { asm::eret_to_el1(entry.entry_point, entry.argument) }
}

#[cfg(not(all(target_arch = "aarch64", not(test))))]
fn enter_lower_el(entry: CoreEntry) -> ! {
    panic!("Can't enter EL1 at {:#x}", entry.entry_point);
}

#[cfg(all(target_arch = "aarch64", not(test)))]
mod asm {
    use super::*;
    use crate::{
        coldboot::{MMU_SCTLR_CLEAR, MMU_SCTLR_SET},
        pagetable::enable_mmu,
        power::CORE_COUNT,
        stacks::{COLDBOOT_STACK_TOP, CORE_STACK_SIZE, core_stack_top},
    };
    use arm_sysregs::{ScrEl3, SpsrEl3 as Spsr};
    use core::arch::global_asm;

    const VECTORS_ADDRESS: usize = TzramSegment::SecmonEvt.physical_address();

    // Exception vectors. Exceptions are not expected while the monitor runs, and SMCs from lower
    // exception levels are not serviced, so every entry parks the core. The last entry is cut
    // short, as the level 1 translation table follows it.
    global_asm!(
        ".section .secmon_evt, \"ax\"",
        ".balign 0x800",
        ".rept 15",
        "b	.",
        ".balign 0x80",
        ".endr",
        "b	.",
    );

    /// The cold boot entrypoint, executed only by the boot core.
    #[unsafe(naked)]
    #[unsafe(no_mangle)]
    #[unsafe(link_section = ".text.entry")]
    unsafe extern "C" fn secmon_entrypoint() -> ! {
        naked_asm!(
            "ldr	x0, ={stack_top}
            mov	sp, x0

            ldr	x0, =__BSS_START__
            ldr	x1, =__BSS_END__
        0:
            cmp	x0, x1
            b.hs	1f
            str	xzr, [x0], #8
            b	0b
        1:
            ldr	x0, ={vectors}
            msr	vbar_el3, x0
            isb

            bl	{secmon_main}
            b	.",
            stack_top = const COLDBOOT_STACK_TOP,
            vectors = const VECTORS_ADDRESS,
            secmon_main = sym secmon_main,
        );
    }

    /// The entrypoint of a core which has been powered on through the PMC.
    ///
    /// This is linked to run from the warm boot segment of TZRAM, so everything outside it is
    /// reached through absolute addresses.
    #[unsafe(naked)]
    #[unsafe(no_mangle)]
    #[unsafe(link_section = ".warm_crt0")]
    unsafe extern "C" fn secmon_warm_entrypoint() -> ! {
        naked_asm!(
            "ldr	x0, ={l1_table}
            ldr	x1, ={sctlr_set}
            ldr	x2, ={sctlr_clear}
            ldr	x9, ={enable_mmu}
            blr	x9

            ldr	x0, ={vectors}
            msr	vbar_el3, x0
            isb

            mrs	x0, mpidr_el1
            and	x0, x0, #0xff
            cmp	x0, #{last_core}
            b.ne	0f
            ldr	x1, ={last_core_stack_top}
            b	1f
        0:
            ldr	x1, ={shared_stacks_base}
            ldr	x2, ={stack_size}
            add	x0, x0, #1
            madd	x1, x0, x2, x1
        1:
            mov	sp, x1

            ldr	x9, ={warm_main}
            blr	x9
            b	.",
            l1_table = const L1_TABLE_PHYSICAL_ADDRESS,
            sctlr_set = const MMU_SCTLR_SET.bits(),
            sctlr_clear = const MMU_SCTLR_CLEAR.bits(),
            vectors = const VECTORS_ADDRESS,
            last_core = const CORE_COUNT - 1,
            last_core_stack_top = const core_stack_top(CORE_COUNT - 1),
            shared_stacks_base = const core_stack_top(0) - CORE_STACK_SIZE,
            stack_size = const CORE_STACK_SIZE,
            enable_mmu = sym enable_mmu,
            warm_main = sym warm_main,
        );
    }

    /// Returns to the non-secure world at EL1h, with `argument` in `x0` and all interrupts masked.
    ///
    /// # Safety
    ///
    /// `entry_point` must be valid non-secure code. This never returns, so nothing on the stack may
    /// be relied upon afterwards.
    #[unsafe(naked)]
    pub unsafe extern "C" fn eret_to_el1(entry_point: u64, argument: u64) -> ! {
        naked_asm!(
            "msr	elr_el3, x0
            ldr	x2, ={spsr}
            msr	spsr_el3, x2
            ldr	x2, ={scr}
            msr	scr_el3, x2
            mov	x0, x1
            mov	x1, xzr
            mov	x2, xzr
            isb
            eret",
            spsr = const Spsr::D
                .union(Spsr::A)
                .union(Spsr::I)
                .union(Spsr::F)
                .union(Spsr::M_AARCH64_EL1H)
                .bits(),
            scr = const ScrEl3::RES1
                .union(ScrEl3::NS)
                .union(ScrEl3::RW)
                .union(ScrEl3::HCE)
                .union(ScrEl3::SIF)
                .bits(),
        );
    }

    /// This macro wraps a naked_asm block with `bti`, or any other universal
    /// prologue we'd still like added.
    ///
    /// Use this over `core::arch::naked_asm` by default, otherwise you may
    /// need to ensure that e.g. `bti` landing pads are in place yourself.
    macro_rules! naked_asm {
        ($($inner:tt)*) => {
           ::core::arch::naked_asm!("bti c", $($inner)*)
        }
    }
    pub(crate) use naked_asm;
}

#[cfg(all(target_arch = "aarch64", not(test)))]
pub(crate) use asm::naked_asm;
