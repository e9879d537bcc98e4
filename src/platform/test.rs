// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

use super::Platform;
use crate::{
    coldboot::{ColdBootPlatform, Section},
    logger::{self, LogSink},
    pmc::{CPU_PARTITIONS, PWRGATE_TOGGLE_START},
    power::{PowerPlatformInterface, SavedRegisters},
    se::fake::FakeSecurityEngine,
    timer::Delay,
};
use core::{
    fmt,
    sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
};
use percore::ExceptionFree;
use spin::mutex::SpinMutex;
use std::io::{Write, stdout};

/// A fake platform for unit tests.
pub struct TestPlatform;

impl Platform for TestPlatform {
    const CORE_COUNT: usize = 4;

    type LogSinkImpl = StdOutSink;
    type PowerPlatformImpl = TestPowerPlatform;
    type SeHardwareImpl = FakeSecurityEngine;
    type ColdBootPlatformImpl = TestColdBootPlatform;

    fn init_logger() {
        logger::init(StdOutSink).expect("Failed to initialise logger");
    }

    fn cold_boot_platform() -> TestColdBootPlatform {
        TestColdBootPlatform::default()
    }

    unsafe fn power_platform() -> TestPowerPlatform {
        TestPowerPlatform::new()
    }

    unsafe fn se_hardware() -> FakeSecurityEngine {
        FakeSecurityEngine::new()
    }

    fn non_secure_entry_point() -> u64 {
        0x8006_0000
    }
}

/// Runs the given function and returns the result.
///
/// This is a fake version of `percore::exception_free` for use in unit tests only, which must be
/// run on a single thread.
pub fn exception_free<T>(f: impl FnOnce(ExceptionFree) -> T) -> T {
    // SAFETY: This is only used in unit tests, which are run on the host where there are no
    // hardware exceptions nor multiple threads.
    let token = unsafe { ExceptionFree::new() };
    f(token)
}

/// A log sink for tests which writes logs to standard output.
pub struct StdOutSink;

impl LogSink for StdOutSink {
    fn write_fmt(&self, args: fmt::Arguments) {
        stdout().write_fmt(args).unwrap();
    }

    fn flush(&self) {
        stdout().flush().unwrap();
    }
}

/// A hardware access made by the power state coordinator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PowerEvent {
    SetPwrgateToggle(u32),
    ClearFlowCsrAndEvents(usize),
    SetFlowCc4Ctrl(usize, u32),
    SaveContext,
    FlushDcacheAll,
    RunOnPowerdownStack,
    PowerDownWfi,
}

/// A fake PMC and flow controller which records every write.
///
/// By default all partitions are off, the PMC is idle, and toggling a partition turns it on.
pub struct TestPowerPlatform {
    events: SpinMutex<Vec<PowerEvent>>,
    pwrgate_status: AtomicU32,
    toggle_busy: AtomicBool,
    partition_responds: AtomicBool,
    waited_us: AtomicU32,
    status_reads: AtomicU32,
    wait_hook: SpinMutex<Option<Box<dyn FnMut() + Send>>>,
    current_core: AtomicUsize,
    saved_registers: SpinMutex<SavedRegisters>,
}

impl TestPowerPlatform {
    pub const POWER_DOWN_WFI_MAGIC: &str = "POWER_DOWN_WFI_MAGIC";

    pub fn new() -> Self {
        Self {
            events: SpinMutex::new(Vec::new()),
            pwrgate_status: AtomicU32::new(0),
            toggle_busy: AtomicBool::new(false),
            partition_responds: AtomicBool::new(true),
            waited_us: AtomicU32::new(0),
            status_reads: AtomicU32::new(0),
            wait_hook: SpinMutex::new(None),
            current_core: AtomicUsize::new(0),
            saved_registers: SpinMutex::new(SavedRegisters::default()),
        }
    }

    /// Returns the hardware accesses so far.
    pub fn events(&self) -> Vec<PowerEvent> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn set_pwrgate_status(&self, status: u32) {
        self.pwrgate_status.store(status, Ordering::SeqCst);
    }

    /// Makes the PMC report a toggle in progress forever.
    pub fn set_pwrgate_toggle_busy(&self, busy: bool) {
        self.toggle_busy.store(busy, Ordering::SeqCst);
    }

    /// Sets whether toggling a partition turns it on.
    pub fn set_partition_responds(&self, responds: bool) {
        self.partition_responds.store(responds, Ordering::SeqCst);
    }

    /// Returns the total time waited through `wait_us`.
    pub fn waited_us(&self) -> u32 {
        self.waited_us.load(Ordering::SeqCst)
    }

    /// Returns the number of `PWRGATE_STATUS` reads so far.
    pub fn status_reads(&self) -> u32 {
        self.status_reads.load(Ordering::SeqCst)
    }

    /// Sets a function to run on every `wait_us`.
    pub fn set_wait_hook(&self, hook: impl FnMut() + Send + 'static) {
        *self.wait_hook.lock() = Some(Box::new(hook));
    }

    pub fn set_current_core(&self, core: usize) {
        self.current_core.store(core, Ordering::SeqCst);
    }

    /// Sets the values the next context save will read.
    pub fn set_saved_registers(&self, registers: SavedRegisters) {
        *self.saved_registers.lock() = registers;
    }

    fn record(&self, event: PowerEvent) {
        self.events.lock().push(event);
    }
}

impl Delay for TestPowerPlatform {
    fn wait_us(&self, us: u32) {
        self.waited_us.fetch_add(us, Ordering::SeqCst);
        if let Some(hook) = self.wait_hook.lock().as_mut() {
            hook();
        }
    }
}

impl PowerPlatformInterface for TestPowerPlatform {
    fn pwrgate_status(&self) -> u32 {
        self.status_reads.fetch_add(1, Ordering::SeqCst);
        self.pwrgate_status.load(Ordering::SeqCst)
    }

    fn pwrgate_toggle(&self) -> u32 {
        if self.toggle_busy.load(Ordering::SeqCst) {
            PWRGATE_TOGGLE_START
        } else {
            0
        }
    }

    fn set_pwrgate_toggle(&self, value: u32) {
        self.record(PowerEvent::SetPwrgateToggle(value));
        if !self.partition_responds.load(Ordering::SeqCst) {
            return;
        }
        if let Some(partition) = CPU_PARTITIONS
            .iter()
            .find(|partition| partition.toggle_code == value & !PWRGATE_TOGGLE_START)
        {
            self.pwrgate_status
                .fetch_or(partition.status_mask, Ordering::SeqCst);
        }
    }

    fn clear_flow_csr_and_events(&self, core: usize) {
        self.record(PowerEvent::ClearFlowCsrAndEvents(core));
    }

    fn set_flow_cc4_ctrl(&self, core: usize, value: u32) {
        self.record(PowerEvent::SetFlowCc4Ctrl(core, value));
    }

    fn current_core(&self) -> usize {
        self.current_core.load(Ordering::SeqCst)
    }

    fn save_current_core_context(&self, registers: &mut SavedRegisters) {
        self.record(PowerEvent::SaveContext);
        *registers = *self.saved_registers.lock();
    }

    fn flush_dcache_all(&self) {
        self.record(PowerEvent::FlushDcacheAll);
    }

    fn run_on_powerdown_stack(&self, f: &mut dyn FnMut()) -> ! {
        self.record(PowerEvent::RunOnPowerdownStack);
        f();
        unreachable!("Power-down function returned");
    }

    fn power_down_wfi(&self) -> ! {
        self.record(PowerEvent::PowerDownWfi);
        panic!("{}", Self::POWER_DOWN_WFI_MAGIC);
    }
}

/// A step of the cold boot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ColdBootEvent {
    Relocate(&'static str),
    FlushDcacheAll,
    InvalidateIcacheAll,
    EnableMmu(usize),
}

/// Fake cold boot operations which record every step.
#[derive(Debug, Default)]
pub struct TestColdBootPlatform {
    pub events: Vec<ColdBootEvent>,
}

impl ColdBootPlatform for TestColdBootPlatform {
    fn relocate(&mut self, section: &Section) {
        self.events.push(ColdBootEvent::Relocate(section.name));
    }

    fn flush_dcache_all(&mut self) {
        self.events.push(ColdBootEvent::FlushDcacheAll);
    }

    fn invalidate_icache_all(&mut self) {
        self.events.push(ColdBootEvent::InvalidateIcacheAll);
    }

    unsafe fn enable_mmu(&mut self, ttbr0: usize) {
        self.events.push(ColdBootEvent::EnableMmu(ttbr0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_partition_turns_it_on() {
        let platform = TestPowerPlatform::new();
        platform.set_pwrgate_toggle(0x10B);
        assert_eq!(platform.pwrgate_status(), 0x800);
        assert_eq!(platform.events(), [PowerEvent::SetPwrgateToggle(0x10B)]);
    }
}
