// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The cold boot sequence, which takes the monitor from its load image in iRAM to running with the
//! MMU on and every core context initialised.

use crate::{
    layout,
    memory_map::{L1_TABLE_PHYSICAL_ADDRESS, SECMON_LAYOUT, TzramSegment},
    pagetable::{MappingError, TranslationTables, build_address_space},
    power::{PowerPlatformInterface, PowerStateCoordinator},
};
use arm_sysregs::SctlrEl3;
use arrayvec::ArrayVec;
use core::ops::Range;
use log::info;
use thiserror::Error;

/// `SCTLR_EL3` bits set when enabling the MMU: MMU, data and instruction caches, stack alignment
/// check.
pub const MMU_SCTLR_SET: SctlrEl3 = SctlrEl3::M
    .union(SctlrEl3::C)
    .union(SctlrEl3::I)
    .union(SctlrEl3::SA);

/// `SCTLR_EL3` bits cleared when enabling the MMU.
pub const MMU_SCTLR_CLEAR: SctlrEl3 = SctlrEl3::A.union(SctlrEl3::WXN);

/// A part of the load image which must be copied to its TZRAM segment before it is used.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Section {
    /// Name for logs.
    pub name: &'static str,
    /// Where the section is in the load image.
    pub load: Range<usize>,
    /// Where the section runs from.
    pub destination: TzramSegment,
}

impl Section {
    /// Returns the number of bytes to copy.
    pub fn size(&self) -> usize {
        self.load.len()
    }

    /// Returns the physical address the section is copied to.
    pub fn destination_address(&self) -> usize {
        self.destination.physical_address()
    }
}

/// The sections of the load image, in the order they are relocated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColdBootImage {
    warmboot_crt0: Section,
    late_sections: ArrayVec<Section, 3>,
}

impl ColdBootImage {
    /// Describes the image from the symbols of the linker script.
    pub fn from_layout() -> Self {
        Self::new(
            layout::warmboot_crt0_load(),
            layout::main_load(),
            layout::pk2ldr_load(),
            layout::vectors_load(),
        )
    }

    /// Describes an image with the given load ranges.
    pub fn new(
        warmboot_crt0: Range<usize>,
        main: Range<usize>,
        pk2ldr: Range<usize>,
        vectors: Range<usize>,
    ) -> Self {
        let mut late_sections = ArrayVec::new();
        late_sections.push(Section {
            name: "main",
            load: main,
            destination: TzramSegment::MainCode,
        });
        late_sections.push(Section {
            name: "pk2ldr",
            load: pk2ldr,
            destination: TzramSegment::Pk2ldr,
        });
        late_sections.push(Section {
            name: "vectors",
            load: vectors,
            destination: TzramSegment::SecmonEvt,
        });
        Self {
            warmboot_crt0: Section {
                name: "warmboot crt0",
                load: warmboot_crt0,
                destination: TzramSegment::WarmbootCrt0,
            },
            late_sections,
        }
    }
}

/// A fatal error during the cold boot.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum ColdBootError {
    /// The address space could not be built.
    #[error("Failed to build the address space: {0}")]
    Mapping(#[from] MappingError),
    /// A section is bigger than its TZRAM segment.
    #[error("Section {name} is too large for its segment")]
    SectionTooLarge {
        /// Name of the section.
        name: &'static str,
    },
    /// The exception vectors would overwrite the level 1 translation table.
    #[error("Exception vectors overlap the level 1 translation table")]
    VectorsOverlapL1,
}

/// The hardware operations of the cold boot.
pub trait ColdBootPlatform {
    /// Copies the section from its load address to its destination.
    fn relocate(&mut self, section: &Section);

    /// Cleans and invalidates the whole data cache.
    fn flush_dcache_all(&mut self);

    /// Invalidates the whole instruction cache.
    fn invalidate_icache_all(&mut self);

    /// Enables the MMU with the given level 1 table, with [`MMU_SCTLR_SET`] set and
    /// [`MMU_SCTLR_CLEAR`] cleared.
    ///
    /// # Safety
    ///
    /// `ttbr0` must be the address of a complete level 1 table which maps the running code and
    /// stack at their current addresses.
    unsafe fn enable_mmu(&mut self, ttbr0: usize);
}

/// Runs the cold boot sequence.
///
/// The warm-boot entry code is relocated first, then the address space is built in `tables`, the
/// remaining sections are relocated, the caches are cleaned and the MMU is enabled. The power
/// platform is only created once the MMU is on. Returns the coordinator with the boot core active
/// and every other core inactive.
///
/// # Safety
///
/// `tables` must be the tables at their final physical addresses, and `image` must describe the
/// load image accurately, as the MMU is enabled with the result.
pub unsafe fn cold_boot<C: ColdBootPlatform, P: PowerPlatformInterface>(
    platform: &mut C,
    tables: &mut TranslationTables,
    image: &ColdBootImage,
    power_platform: impl FnOnce() -> P,
) -> Result<PowerStateCoordinator<P>, ColdBootError> {
    relocate(platform, &image.warmboot_crt0)?;

    build_address_space(tables, &SECMON_LAYOUT)?;

    for section in &image.late_sections {
        relocate(platform, section)?;
    }

    platform.flush_dcache_all();
    platform.invalidate_icache_all();

    // SAFETY: `tables` now maps all of the monitor, as checked by `build_address_space`, and is at
    // its final physical address as promised by our caller.
    unsafe {
        platform.enable_mmu(tables.root_address());
    }

    let coordinator = PowerStateCoordinator::new(power_platform());
    info!("Cold boot complete.");
    Ok(coordinator)
}

fn relocate(platform: &mut impl ColdBootPlatform, section: &Section) -> Result<(), ColdBootError> {
    if section.size() > section.destination.size() {
        return Err(ColdBootError::SectionTooLarge { name: section.name });
    }
    if section.destination == TzramSegment::SecmonEvt
        && section.destination_address() + section.size() > L1_TABLE_PHYSICAL_ADDRESS
    {
        return Err(ColdBootError::VectorsOverlapL1);
    }
    platform.relocate(section);
    Ok(())
}
