// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Coordination of CPU core power states.
//!
//! Each core has a [`CoreContext`] recording whether it is off, on its way up, or running, and
//! where it should start executing once powered. Cores are powered on through the PMC power gates
//! and powered off through the flow controller.

use crate::{
    aarch64::{dsb_sy, wfi},
    pmc::{CPU_PARTITIONS, PWRGATE_TOGGLE_START},
    platform::{Platform, PlatformImpl, PowerPlatformImpl},
    timer::{Delay, Timeout, poll_with_budget},
};
use arm_psci::ErrorCode;
use log::{debug, info, warn};
use spin::{Once, mutex::SpinMutex};
use thiserror::Error;

/// Number of CPU cores.
pub const CORE_COUNT: usize = PlatformImpl::CORE_COUNT;

const _: () = assert!(CORE_COUNT == CPU_PARTITIONS.len());

/// Number of attempts made when polling a power-gate register.
const POWER_GATE_POLL_BUDGET: u32 = 5001;
/// Delay in microseconds between power-gate polls.
const POWER_GATE_POLL_INTERVAL_US: u32 = 1;

/// The core which performs the cold boot and is therefore running from the start.
const BOOT_CORE: usize = 0;
/// The core whose stack lives in its own TZRAM segment, and which can power down without switching
/// stacks.
const CORE_WITH_OWN_STACK_SEGMENT: usize = 3;

/// The power state of a core, as far as the secure monitor is concerned.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CoreState {
    /// Powered off, or never powered on.
    #[default]
    Inactive,
    /// Power-on has been requested, but the core has not yet reached the secure monitor.
    PoweringOn,
    /// Running.
    Active,
}

/// EL1 debug registers saved when a core powers down.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SavedRegisters {
    /// `MDSCR_EL1`.
    pub mdscr_el1: u64,
    /// `MDCCINT_EL1`.
    pub mdccint_el1: u64,
}

/// Where a core should start executing in the lower exception level after power-on.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CoreEntry {
    /// Entry point address.
    pub entry_point: u64,
    /// Value passed to the entry point in `x0`.
    pub argument: u64,
}

/// The execution context kept for each core across power transitions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CoreContext {
    /// Current power state.
    pub state: CoreState,
    /// Entry point recorded by the last power-on request.
    pub entry: CoreEntry,
    /// Registers saved at the last power-down.
    pub saved_registers: SavedRegisters,
}

impl CoreContext {
    const INACTIVE: Self = Self {
        state: CoreState::Inactive,
        entry: CoreEntry {
            entry_point: 0,
            argument: 0,
        },
        saved_registers: SavedRegisters {
            mdscr_el1: 0,
            mdccint_el1: 0,
        },
    };
}

/// An error from a power state request.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum PowerError {
    /// The core index is out of range.
    #[error("Invalid core index")]
    InvalidCore,
    /// The core is already running.
    #[error("Core is already active")]
    AlreadyActive,
    /// A power-on request for the core is already in progress.
    #[error("Core power-on is already pending")]
    OnPending,
    /// The calling core is not marked as running.
    #[error("Core is not active")]
    AlreadyInactive,
    /// The PMC did not respond in time.
    #[error("Timed out waiting for the power gate")]
    Timeout,
}

impl From<Timeout> for PowerError {
    fn from(_: Timeout) -> Self {
        Self::Timeout
    }
}

impl From<PowerError> for ErrorCode {
    fn from(error: PowerError) -> Self {
        match error {
            PowerError::InvalidCore => Self::InvalidParameters,
            PowerError::AlreadyActive => Self::AlreadyOn,
            PowerError::OnPending => Self::OnPending,
            PowerError::AlreadyInactive => Self::Denied,
            PowerError::Timeout => Self::InternalFailure,
        }
    }
}

/// Converts the result of a power request to the 32-bit value returned to the caller in `w0`.
pub fn psci_return_code(result: Result<(), PowerError>) -> u32 {
    match result {
        Ok(()) => 0,
        Err(error) => u64::from(ErrorCode::from(error)) as u32,
    }
}

/// The hardware operations used by the power state coordinator.
pub trait PowerPlatformInterface: Delay {
    /// Reads the PMC `PWRGATE_STATUS` register.
    fn pwrgate_status(&self) -> u32;

    /// Reads the PMC `PWRGATE_TOGGLE` register.
    fn pwrgate_toggle(&self) -> u32;

    /// Writes the PMC `PWRGATE_TOGGLE` register.
    fn set_pwrgate_toggle(&self, value: u32);

    /// Clears the flow controller CSR and halt events of the given core.
    fn clear_flow_csr_and_events(&self, core: usize);

    /// Writes the flow controller CC4 control register of the given core.
    fn set_flow_cc4_ctrl(&self, core: usize, value: u32);

    /// Returns the index of the calling core.
    fn current_core(&self) -> usize;

    /// Saves the registers of the calling core which must survive power-down.
    fn save_current_core_context(&self, registers: &mut SavedRegisters);

    /// Cleans and invalidates the whole data cache.
    fn flush_dcache_all(&self);

    /// Switches to the dedicated power-down stack and calls `f` there. `f` must not return.
    ///
    /// Used by cores whose stack shares a TZRAM page with the stacks of other cores.
    fn run_on_powerdown_stack(&self, f: &mut dyn FnMut()) -> !;

    /// Waits for the flow controller to remove power from the calling core.
    fn power_down_wfi(&self) -> ! {
        dsb_sy();
        loop {
            wfi();
        }
    }
}

/// Tracks the power state of every core and drives the power transitions.
pub struct PowerStateCoordinator<P: PowerPlatformInterface> {
    platform: P,
    contexts: SpinMutex<[CoreContext; CORE_COUNT]>,
}

impl<P: PowerPlatformInterface> PowerStateCoordinator<P> {
    /// Creates a new coordinator, with the boot core active and all other cores inactive.
    pub fn new(platform: P) -> Self {
        let mut contexts = [CoreContext::INACTIVE; CORE_COUNT];
        contexts[BOOT_CORE].state = CoreState::Active;
        Self {
            platform,
            contexts: SpinMutex::new(contexts),
        }
    }

    /// Returns the platform implementation.
    #[cfg(test)]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Returns a copy of the context of the given core.
    pub fn core_context(&self, core: usize) -> Option<CoreContext> {
        self.contexts.lock().get(core).copied()
    }

    /// Requests that the given core be powered on, starting at `entry_point` with `argument`.
    ///
    /// The entry point is recorded and the core moves to [`CoreState::PoweringOn`]. If its power
    /// partition is not already on, the PMC is asked to toggle it and the request returns once the
    /// partition reports as powered. If the PMC does not respond in time the core goes back to
    /// [`CoreState::Inactive`].
    pub fn request_core_on(
        &self,
        core: usize,
        entry_point: u64,
        argument: u64,
    ) -> Result<(), PowerError> {
        if core >= CORE_COUNT {
            return Err(PowerError::InvalidCore);
        }

        {
            let mut contexts = self.contexts.lock();
            let context = &mut contexts[core];
            match context.state {
                CoreState::Active => return Err(PowerError::AlreadyActive),
                CoreState::PoweringOn => return Err(PowerError::OnPending),
                CoreState::Inactive => {}
            }

            context.entry = CoreEntry {
                entry_point,
                argument,
            };
            context.state = CoreState::PoweringOn;
        }

        // `PoweringOn` keeps other requests for this core out while the PMC is polled.
        if let Err(error) = self.power_on_partition(core) {
            warn!("Powering on core {core} failed: {error}");
            self.contexts.lock()[core].state = CoreState::Inactive;
            return Err(error.into());
        }

        debug!("Core {core} powering on at {entry_point:#x}");
        Ok(())
    }

    fn power_on_partition(&self, core: usize) -> Result<(), Timeout> {
        let partition = CPU_PARTITIONS[core];
        let partition_on = || self.platform.pwrgate_status() & partition.status_mask != 0;
        if partition_on() {
            return Ok(());
        }

        poll_with_budget(
            &self.platform,
            POWER_GATE_POLL_BUDGET,
            POWER_GATE_POLL_INTERVAL_US,
            || self.platform.pwrgate_toggle() & PWRGATE_TOGGLE_START == 0,
        )?;
        self.platform
            .set_pwrgate_toggle(partition.toggle_code | PWRGATE_TOGGLE_START);
        poll_with_budget(
            &self.platform,
            POWER_GATE_POLL_BUDGET,
            POWER_GATE_POLL_INTERVAL_US,
            partition_on,
        )
    }

    /// Marks the calling core as active after it has been powered on, and returns the entry point
    /// it should continue at.
    ///
    /// # Panics
    ///
    /// Panics if the calling core was not being powered on.
    pub fn handle_core_boot(&self) -> CoreEntry {
        let core = self.platform.current_core();
        let mut contexts = self.contexts.lock();
        let context = &mut contexts[core];
        assert_eq!(
            context.state,
            CoreState::PoweringOn,
            "Core {core} booted without a power-on request"
        );
        context.state = CoreState::Active;
        debug!("Core {core} is now active");
        context.entry
    }

    /// Powers off the calling core.
    ///
    /// This doesn't return if successful.
    pub fn power_off_current_core(&self) -> Result<(), PowerError> {
        let core = self.platform.current_core();
        if self.contexts.lock()[core].state != CoreState::Active {
            return Err(PowerError::AlreadyInactive);
        }

        info!("Powering off core {core}");
        if core == CORE_WITH_OWN_STACK_SEGMENT {
            self.power_down(core)
        } else {
            self.platform.run_on_powerdown_stack(&mut || {
                self.power_down(core);
            })
        }
    }

    fn power_down(&self, core: usize) -> ! {
        self.platform.clear_flow_csr_and_events(core);
        self.platform.set_flow_cc4_ctrl(core, 0);

        let mut saved_registers = SavedRegisters::default();
        self.platform
            .save_current_core_context(&mut saved_registers);
        {
            let mut contexts = self.contexts.lock();
            contexts[core].saved_registers = saved_registers;
            contexts[core].state = CoreState::Inactive;
        }

        self.platform.flush_dcache_all();
        self.platform.power_down_wfi()
    }
}

static POWER_STATE_COORDINATOR: Once<PowerStateCoordinator<PowerPlatformImpl>> = Once::new();

/// Makes the given coordinator the one used by all cores from now on.
///
/// # Panics
///
/// Panics if a coordinator was already installed.
#[cfg_attr(test, allow(unused))]
pub fn install(coordinator: PowerStateCoordinator<PowerPlatformImpl>) {
    let mut installed = false;
    POWER_STATE_COORDINATOR.call_once(|| {
        installed = true;
        coordinator
    });
    assert!(installed, "Power state coordinator already installed");
}

/// Returns the coordinator installed by the cold boot.
#[cfg_attr(test, allow(unused))]
pub fn coordinator() -> &'static PowerStateCoordinator<PowerPlatformImpl> {
    POWER_STATE_COORDINATOR
        .get()
        .expect("Power state coordinator not installed")
}
