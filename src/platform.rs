// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

macro_rules! select_platform {
    (platform = $condition:literal, $mod:ident::$plat_impl:ident) => {
        #[cfg(platform = $condition)]
        mod $mod;

        #[cfg(platform = $condition)]
        pub use $mod::$plat_impl as PlatformImpl;
    };
    (test, $mod:ident::$plat_impl:ident) => {
        #[cfg(test)]
        pub mod $mod;

        #[cfg(test)]
        pub use $mod::$plat_impl as PlatformImpl;
    };
}

select_platform!(platform = "icosa", icosa::Icosa);
select_platform!(test, test::TestPlatform);

use crate::{
    coldboot::ColdBootPlatform, logger::LogSink, power::PowerPlatformInterface, se::SeHardware,
};
use arm_sysregs::read_mpidr_el1;
use core::cell::RefCell;
#[cfg(not(test))]
pub use percore::exception_free;
use percore::{Cores, ExceptionLock, PerCore};
#[cfg(test)]
pub use test::exception_free;

/// Type alias for convenience, to avoid having to use the complicated type name everywhere.
pub type LogSinkImpl = <PlatformImpl as Platform>::LogSinkImpl;

pub type PowerPlatformImpl = <PlatformImpl as Platform>::PowerPlatformImpl;
pub type SeHardwareImpl = <PlatformImpl as Platform>::SeHardwareImpl;
pub type ColdBootPlatformImpl = <PlatformImpl as Platform>::ColdBootPlatformImpl;

/// Per-core state, indexed by [`CoresImpl`].
pub type PerCoreState<T> =
    PerCore<ExceptionLock<RefCell<T>>, CoresImpl, { PlatformImpl::CORE_COUNT }>;

/// Implementation of the `Cores` trait to get the index of the current CPU core.
pub struct CoresImpl;

// SAFETY: The four cores of the Tegra X1 CPU cluster have distinct `Aff0` values from 0 to 3, and
// `Platform::CORE_COUNT` is 4.
unsafe impl Cores for CoresImpl {
    fn core_index() -> usize {
        usize::from(read_mpidr_el1().aff0())
    }
}

/// The hooks implemented by all platforms.
pub trait Platform {
    /// The number of CPU cores.
    const CORE_COUNT: usize;

    /// Platform dependent LogSink implementation type for Logger.
    type LogSinkImpl: LogSink;

    /// Hardware used by the power state coordinator.
    type PowerPlatformImpl: PowerPlatformInterface;

    /// Registers and DMA view of the security engine.
    type SeHardwareImpl: SeHardware + Send;

    /// The operations performed during the cold boot.
    type ColdBootPlatformImpl: ColdBootPlatform;

    /// Initialises the logger. This is called once the MMU is enabled, so device windows are
    /// reachable.
    ///
    /// Any logs sent before this is called will be ignored.
    fn init_logger();

    /// Creates the cold boot operations.
    fn cold_boot_platform() -> Self::ColdBootPlatformImpl;

    /// Creates the power management hardware drivers.
    ///
    /// # Safety
    ///
    /// This must only be called once, after the MMU is enabled, to avoid creating aliases of the
    /// PMC and flow controller drivers.
    unsafe fn power_platform() -> Self::PowerPlatformImpl;

    /// Creates the security engine driver.
    ///
    /// # Safety
    ///
    /// This must only be called once, after the MMU is enabled, to avoid creating aliases of the SE
    /// driver.
    unsafe fn se_hardware() -> Self::SeHardwareImpl;

    /// Returns the address at which the boot core enters the non-secure world after the cold boot.
    fn non_secure_entry_point() -> u64;
}
