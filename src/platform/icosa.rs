// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

use super::{CoresImpl, Platform};
use crate::{
    cache,
    coldboot::{ColdBootPlatform, MMU_SCTLR_CLEAR, MMU_SCTLR_SET, Section},
    emc::Emc,
    flow::{FlowController, FlowControllerRegisters},
    logger::{self, LockedWriter, MirroredSink, inmemory::PerCoreLog},
    memory_map::MmioDevice,
    pagetable,
    pmc::{PMC_OFFSET, Pmc, PmcRegisters},
    power::{PowerPlatformInterface, SavedRegisters},
    se::SeRegisters,
    stacks::{POWERDOWN_STACK_TOP, call_with_stack_pointer},
    timer::{Delay, Timerus, TimerusRegisters},
    uart::{Uart, UartRegisters},
};
use arm_sysregs::{read_mdccint_el1, read_mdscr_el1};
use core::ffi::c_void;
use log::debug;
use percore::Cores;
use spin::mutex::SpinMutex;

/// Bytes of in-memory log kept per core.
const LOG_BUFFER_SIZE: usize = 0x100;

/// Address at which the boot core enters the non-secure world, where the bootloader places the
/// kernel.
const NON_SECURE_ENTRY_POINT: u64 = 0x8006_0000;

static CORE_LOGS: PerCoreLog<LOG_BUFFER_SIZE> = PerCoreLog::new();

fn timerus() -> Timerus {
    // SAFETY: The TIMERS window is mapped as device memory once the MMU is on, and reading TIMERUS
    // has no side effects so aliases are fine.
    unsafe { Timerus::new(MmioDevice::Timers.virtual_address() as *mut TimerusRegisters) }
}

/// The Tegra X1 SoC of the Nintendo Switch.
pub struct Icosa;

impl Platform for Icosa {
    const CORE_COUNT: usize = 4;

    type LogSinkImpl = MirroredSink<&'static PerCoreLog<LOG_BUFFER_SIZE>, LockedWriter<Uart>>;
    type PowerPlatformImpl = IcosaPowerPlatform;
    type SeHardwareImpl = SeRegisters;
    type ColdBootPlatformImpl = IcosaColdBoot;

    fn init_logger() {
        // SAFETY: The UART-A window is mapped as device memory once the MMU is on, and nothing else
        // in the monitor uses UART-A.
        let uart = unsafe { Uart::new(MmioDevice::Uart.virtual_address() as *mut UartRegisters) };
        logger::init(MirroredSink::new(&CORE_LOGS, LockedWriter::new(uart)))
            .expect("Failed to initialise logger");

        for device in [MmioDevice::Emc0, MmioDevice::Emc1] {
            // SAFETY: The EMC channel windows are mapped as device memory once the MMU is on, and
            // only the status register is read.
            let emc = unsafe { Emc::new(device.virtual_address() as *mut u32) };
            debug!(
                "{device:?} status {:?}, DRAM in self-refresh: {}",
                emc.status(),
                emc.dram_in_self_refresh()
            );
        }
    }

    fn cold_boot_platform() -> IcosaColdBoot {
        IcosaColdBoot
    }

    unsafe fn power_platform() -> IcosaPowerPlatform {
        // SAFETY: The PMC and flow controller windows are mapped as device memory once the MMU is on,
        // and our caller promises not to create another instance.
        unsafe {
            IcosaPowerPlatform {
                pmc: SpinMutex::new(Pmc::new(
                    (MmioDevice::RtcPmc.virtual_address() + PMC_OFFSET) as *mut PmcRegisters,
                )),
                flow: SpinMutex::new(FlowController::new(
                    MmioDevice::FlowController.virtual_address() as *mut FlowControllerRegisters,
                )),
                timer: timerus(),
            }
        }
    }

    unsafe fn se_hardware() -> SeRegisters {
        // SAFETY: The SE window is mapped as device memory once the MMU is on, and our caller
        // promises not to create another instance.
        unsafe {
            SeRegisters::new(
                MmioDevice::SecurityEngine.virtual_address() as *mut u32,
                timerus(),
            )
        }
    }

    fn non_secure_entry_point() -> u64 {
        NON_SECURE_ENTRY_POINT
    }
}

/// The PMC power gates and flow controller of the CPU cluster.
pub struct IcosaPowerPlatform {
    pmc: SpinMutex<Pmc>,
    flow: SpinMutex<FlowController>,
    timer: Timerus,
}

impl Delay for IcosaPowerPlatform {
    fn wait_us(&self, us: u32) {
        self.timer.wait_us(us);
    }
}

impl PowerPlatformInterface for IcosaPowerPlatform {
    fn pwrgate_status(&self) -> u32 {
        self.pmc.lock().pwrgate_status()
    }

    fn pwrgate_toggle(&self) -> u32 {
        self.pmc.lock().pwrgate_toggle()
    }

    fn set_pwrgate_toggle(&self, value: u32) {
        self.pmc.lock().set_pwrgate_toggle(value);
    }

    fn clear_flow_csr_and_events(&self, core: usize) {
        self.flow.lock().clear_csr_and_events(core);
    }

    fn set_flow_cc4_ctrl(&self, core: usize, value: u32) {
        self.flow.lock().set_cc4_core_ctrl(core, value);
    }

    fn current_core(&self) -> usize {
        CoresImpl::core_index()
    }

    fn save_current_core_context(&self, registers: &mut SavedRegisters) {
        registers.mdscr_el1 = read_mdscr_el1().bits();
        registers.mdccint_el1 = read_mdccint_el1().bits();
    }

    fn flush_dcache_all(&self) {
        cache::flush_dcache_all();
    }

    fn run_on_powerdown_stack(&self, mut f: &mut dyn FnMut()) -> ! {
        // SAFETY: The power-down stack is only used by a core of the shared stack page while it
        // powers down, which the flow controller serialises. `f` lives on the old stack, which is
        // left untouched.
        unsafe {
            call_with_stack_pointer(
                POWERDOWN_STACK_TOP,
                call_powerdown_function,
                (&raw mut f).cast(),
            )
        }
    }
}

/// Calls the `&mut dyn FnMut()` which `f` points to, which must power down the core.
///
/// # Safety
///
/// `f` must point to a valid `&mut dyn FnMut()`.
unsafe extern "C" fn call_powerdown_function(f: *mut c_void) -> ! {
    // SAFETY: Our caller promises that `f` points to a valid closure reference.
    let f = unsafe { &mut *f.cast::<&mut dyn FnMut()>() };
    f();
    panic!("Core still running after power-down");
}

/// The cold boot operations, running from physical addresses until the MMU is enabled.
pub struct IcosaColdBoot;

impl ColdBootPlatform for IcosaColdBoot {
    fn relocate(&mut self, section: &Section) {
        debug_assert!(section.load.start % 8 == 0);
        let source = section.load.start as *const u64;
        let destination = section.destination_address() as *mut u64;
        for index in 0..section.size().div_ceil(8) {
            // SAFETY: Sections are 8-byte aligned and padded by the linker script, the load image
            // and TZRAM are both reachable at their physical addresses, and the cold boot has
            // checked that the section fits its segment.
            unsafe {
                destination
                    .add(index)
                    .write_volatile(source.add(index).read_volatile());
            }
        }
    }

    fn flush_dcache_all(&mut self) {
        cache::flush_dcache_all();
    }

    fn invalidate_icache_all(&mut self) {
        cache::invalidate_icache_all();
    }

    unsafe fn enable_mmu(&mut self, ttbr0: usize) {
        // SAFETY: Our caller promises that `ttbr0` is a complete level 1 table mapping the running
        // code and stack.
        unsafe {
            pagetable::enable_mmu(ttbr0, MMU_SCTLR_SET.bits(), MMU_SCTLR_CLEAR.bits());
        }
    }
}
