// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Construction of the secure monitor's three-level translation tables, and the MMU configuration
//! that goes with them.

use crate::memory_map::{AddressSpaceLayout, Granularity, MappingRegion, RegionTable};
use aarch64_paging::{
    descriptor::Attributes,
    mair::{Mair, MairAttribute, NormalMemory},
};
use log::{debug, trace};
use thiserror::Error;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// Size of a translation granule, and of a level 3 page.
pub const PAGE_SIZE: usize = 0x1000;
const L2_BLOCK_SIZE: usize = 0x20_0000;
const L1_BLOCK_SIZE: usize = 0x4000_0000;

/// Number of entries in the level 1 table, for a 33-bit virtual address space.
pub const L1_ENTRY_COUNT: usize = 8;
/// Number of entries in a level 2 or level 3 table.
pub const ENTRY_COUNT: usize = 512;
/// Size of the virtual address space covered by the level 1 table.
const VA_SPACE_SIZE: usize = L1_ENTRY_COUNT * L1_BLOCK_SIZE;

// Indices of entries in the Memory Attribute Indirection Register.
const MAIR_NORMAL_INDEX: u8 = 0;
const MAIR_DEVICE_INDEX: u8 = 1;

const MAIR_NORMAL: MairAttribute = MairAttribute::normal(
    NormalMemory::WriteBackNonTransientReadWriteAllocate,
    NormalMemory::WriteBackNonTransientReadWriteAllocate,
);
const MAIR_DEVICE: MairAttribute = MairAttribute::DEVICE_NGNRE;

/// Value for `MAIR_EL3`.
#[cfg_attr(test, allow(unused))]
pub const MAIR: Mair = Mair::EMPTY
    .with_attribute(MAIR_NORMAL_INDEX, MAIR_NORMAL)
    .with_attribute(MAIR_DEVICE_INDEX, MAIR_DEVICE);

/// Value for `TCR_EL3`.
pub const TCR: u64 = (1 << 31) // RES1
    | (1 << 23) // RES1
    | (0b001 << 16) // 36 bit physical address size (64 GiB).
    | (0b00 << 14) // 4 KiB granule.
    | (0b11 << 12) // Inner shareable table walks.
    | (0b01 << 10) // Outer write-back write-allocate table walks.
    | (0b01 << 8) // Inner write-back write-allocate table walks.
    | (64 - 33); // Size offset is 2**33 bytes (8 GiB).

const NORMAL: Attributes = Attributes::ATTRIBUTE_INDEX_0;
const DEVICE: Attributes = Attributes::ATTRIBUTE_INDEX_1;

/// The NS bit of block and page descriptors.
pub const NON_SECURE: Attributes = Attributes::from_bits_retain(1 << 5);

/// Attribute bits which are RES1 for the EL3 translation regime.
const EL3_RES1: Attributes = Attributes::USER;

/// Attributes used for all mappings.
///
/// The access flag is always set, as access flag faults are not handled.
const BASE: Attributes = EL3_RES1
    .union(Attributes::ACCESSED)
    .union(Attributes::VALID);

/// Attributes used for secure device mappings.
///
/// Device memory is always mapped as execute-never, to avoid speculative instruction fetches from
/// read-sensitive peripherals.
pub const MT_DEVICE: Attributes = DEVICE.union(BASE).union(Attributes::UXN);

/// Attributes used for non-secure device mappings.
pub const MT_DEVICE_NS: Attributes = MT_DEVICE.union(NON_SECURE);

/// Attributes used for secure normal memory which may be executed.
pub const MT_MEMORY: Attributes = NORMAL.union(BASE).union(Attributes::INNER_SHAREABLE);

/// Attributes used for the secure monitor's code segments.
pub const MT_CODE: Attributes = MT_MEMORY;

/// Attributes used for the secure monitor's read-write data segments.
pub const MT_RW_DATA: Attributes = MT_MEMORY.union(Attributes::UXN);

/// Attributes used for non-secure memory which is never executed by the secure monitor.
pub const MT_NS_MEMORY_XN: Attributes = MT_MEMORY.union(Attributes::UXN).union(NON_SECURE);

const DESCRIPTOR_TYPE_MASK: u64 = 0b11;
const DESCRIPTOR_BLOCK: u64 = 0b01;
const DESCRIPTOR_TABLE_OR_PAGE: u64 = 0b11;
const OUTPUT_ADDRESS_MASK: u64 = 0x0000_FFFF_FFFF_F000;

/// An error building the translation tables.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum MappingError {
    /// A descriptor slot already holds a different valid mapping.
    #[error("Mapping for {va:#x} conflicts with an existing mapping")]
    Conflict {
        /// The virtual address whose slot is already taken.
        va: usize,
    },
    /// The virtual address is not reachable through the shared level 2 and level 3 tables.
    #[error("Virtual address {va:#x} is not covered by the translation tables")]
    NotCovered {
        /// The virtual address which could not be mapped.
        va: usize,
    },
    /// A region is not aligned to its mapping granularity.
    #[error("Region at {base:#x} is not aligned to its granularity")]
    Misaligned {
        /// The physical base address of the offending region.
        base: usize,
    },
}

/// The 8-entry level 1 translation table.
#[derive(Debug, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C, align(64))]
pub struct RootTable {
    entries: [u64; L1_ENTRY_COUNT],
}

/// A 512-entry level 2 or level 3 translation table.
#[derive(Debug, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [u64; ENTRY_COUNT],
}

/// The three tables of the secure monitor's address space.
///
/// The level 1 table has two table descriptors, both pointing at the single level 2 table. The
/// level 2 table in turn has three table descriptors pointing at the single level 3 table, so
/// several 2 MiB windows of the address space share the same pages. Regions are placed so that
/// they use distinct level 3 entries, and any attempt to reuse an entry for a different mapping is
/// reported as a conflict.
#[derive(Debug)]
pub struct TranslationTables<'a> {
    l1: &'a mut RootTable,
    l2: &'a mut PageTable,
    l3: &'a mut PageTable,
    l1_pa: usize,
    l2_pa: usize,
    l3_pa: usize,
}

/// Level 1 entries which point at the level 2 table.
const L1_TABLE_VAS: [usize; 2] = [0x4000_0000, 0x1_C000_0000];
/// Level 2 entries which point at the level 3 table.
const L2_TABLE_VAS: [usize; 3] = [0x4000_0000, 0x7C00_0000, 0x1_F000_0000];

impl<'a> TranslationTables<'a> {
    /// Wraps the given table storage.
    ///
    /// The physical address of each table is taken to be its current address, which holds while
    /// the MMU is off.
    pub fn new(l1: &'a mut RootTable, l2: &'a mut PageTable, l3: &'a mut PageTable) -> Self {
        let l1_pa = core::ptr::from_mut(l1) as usize;
        let l2_pa = core::ptr::from_mut(l2) as usize;
        let l3_pa = core::ptr::from_mut(l3) as usize;
        Self {
            l1,
            l2,
            l3,
            l1_pa,
            l2_pa,
            l3_pa,
        }
    }

    /// Returns the physical address of the level 1 table, for `TTBR0_EL3`.
    pub fn root_address(&self) -> usize {
        self.l1_pa
    }

    fn zero(&mut self) {
        self.l1.zero();
        self.l2.zero();
        self.l3.zero();
    }

    fn l2_table_descriptor(&self) -> u64 {
        self.l2_pa as u64 | DESCRIPTOR_TABLE_OR_PAGE
    }

    fn l3_table_descriptor(&self) -> u64 {
        self.l3_pa as u64 | DESCRIPTOR_TABLE_OR_PAGE
    }

    /// Writes `descriptor` to `slot`, unless the slot already holds a different valid descriptor.
    fn install(slot: &mut u64, descriptor: u64, va: usize) -> Result<(), MappingError> {
        if *slot & 1 != 0 && *slot != descriptor {
            return Err(MappingError::Conflict { va });
        }
        *slot = descriptor;
        Ok(())
    }

    fn link_tables(&mut self) -> Result<(), MappingError> {
        let l2_descriptor = self.l2_table_descriptor();
        for va in L1_TABLE_VAS {
            Self::install(&mut self.l1.entries[l1_index(va)], l2_descriptor, va)?;
        }
        let l3_descriptor = self.l3_table_descriptor();
        for va in L2_TABLE_VAS {
            Self::install(&mut self.l2.entries[l2_index(va)], l3_descriptor, va)?;
        }
        Ok(())
    }

    /// Returns whether the level 1 and level 2 entries for `va` lead to the level 3 table.
    fn reaches_l3(&self, va: usize) -> bool {
        va < VA_SPACE_SIZE
            && self.l1.entries[l1_index(va)] == self.l2_table_descriptor()
            && self.l2.entries[l2_index(va)] == self.l3_table_descriptor()
    }

    fn map_region(&mut self, va: usize, region: &MappingRegion) -> Result<(), MappingError> {
        debug!(
            "Mapping {:#x}-{:#x} at {va:#x} as {:?}.",
            region.base,
            region.base + region.size,
            region.attributes
        );
        let attributes = region.attributes.bits() as u64;
        match region.granularity {
            Granularity::Block => {
                check_alignment(va, region, L1_BLOCK_SIZE)?;
                for offset in (0..region.size).step_by(L1_BLOCK_SIZE) {
                    let va = va + offset;
                    if va >= VA_SPACE_SIZE {
                        return Err(MappingError::NotCovered { va });
                    }
                    let descriptor = (region.base + offset) as u64 | attributes | DESCRIPTOR_BLOCK;
                    Self::install(&mut self.l1.entries[l1_index(va)], descriptor, va)?;
                }
            }
            Granularity::Page => {
                check_alignment(va, region, PAGE_SIZE)?;
                for offset in (0..region.size).step_by(PAGE_SIZE) {
                    let va = va + offset;
                    if !self.reaches_l3(va) {
                        return Err(MappingError::NotCovered { va });
                    }
                    let descriptor =
                        (region.base + offset) as u64 | attributes | DESCRIPTOR_TABLE_OR_PAGE;
                    Self::install(&mut self.l3.entries[l3_index(va)], descriptor, va)?;
                }
            }
        }
        Ok(())
    }

    fn map_table(&mut self, table: &RegionTable) -> Result<(), MappingError> {
        trace!("Installing {} regions.", table.name);
        for (index, region) in table.regions.iter().enumerate() {
            self.map_region(table.virtual_address(index), region)?;
        }
        Ok(())
    }

    /// Walks the tables for the given virtual address, returning the physical address and the
    /// attributes it is mapped with, if any.
    pub fn translate(&self, va: usize) -> Option<(usize, Attributes)> {
        if va >= VA_SPACE_SIZE {
            return None;
        }
        let l1_descriptor = self.l1.entries[l1_index(va)];
        match l1_descriptor & DESCRIPTOR_TYPE_MASK {
            DESCRIPTOR_BLOCK => {
                return Some(output(l1_descriptor, va, L1_BLOCK_SIZE));
            }
            DESCRIPTOR_TABLE_OR_PAGE if l1_descriptor == self.l2_table_descriptor() => {}
            _ => return None,
        }
        let l2_descriptor = self.l2.entries[l2_index(va)];
        match l2_descriptor & DESCRIPTOR_TYPE_MASK {
            DESCRIPTOR_BLOCK => {
                return Some(output(l2_descriptor, va, L2_BLOCK_SIZE));
            }
            DESCRIPTOR_TABLE_OR_PAGE if l2_descriptor == self.l3_table_descriptor() => {}
            _ => return None,
        }
        let l3_descriptor = self.l3.entries[l3_index(va)];
        if l3_descriptor & DESCRIPTOR_TYPE_MASK == DESCRIPTOR_TABLE_OR_PAGE {
            Some(output(l3_descriptor, va, PAGE_SIZE))
        } else {
            None
        }
    }
}

fn l1_index(va: usize) -> usize {
    (va / L1_BLOCK_SIZE) % L1_ENTRY_COUNT
}

fn l2_index(va: usize) -> usize {
    (va / L2_BLOCK_SIZE) % ENTRY_COUNT
}

fn l3_index(va: usize) -> usize {
    (va / PAGE_SIZE) % ENTRY_COUNT
}

fn check_alignment(va: usize, region: &MappingRegion, alignment: usize) -> Result<(), MappingError> {
    if va % alignment != 0 || region.base % alignment != 0 || region.size % alignment != 0 {
        Err(MappingError::Misaligned { base: region.base })
    } else {
        Ok(())
    }
}

/// Splits a leaf descriptor into the output address for `va` and its attributes.
fn output(descriptor: u64, va: usize, block_size: usize) -> (usize, Attributes) {
    let base = (descriptor & OUTPUT_ADDRESS_MASK) as usize & !(block_size - 1);
    let attributes = Attributes::from_bits_retain(
        (descriptor & !OUTPUT_ADDRESS_MASK & !DESCRIPTOR_TABLE_OR_PAGE) as usize,
    )
    .union(Attributes::VALID);
    (base | (va & (block_size - 1)), attributes)
}

/// Builds the secure monitor's address space in the given tables.
///
/// The tables are zeroed, linked together, and then every region of `layout` is installed, table by
/// table in order.
pub fn build_address_space(
    tables: &mut TranslationTables,
    layout: &AddressSpaceLayout,
) -> Result<(), MappingError> {
    tables.zero();
    tables.link_tables()?;
    for table in layout.tables() {
        tables.map_table(table)?;
    }
    debug!("Address space built, root table at {:#x}.", tables.root_address());
    Ok(())
}

/// Enables the MMU with the given root table.
///
/// Sets `MAIR_EL3`, `TCR_EL3` and `TTBR0_EL3` then sets
/// `SCTLR_EL3 = (SCTLR_EL3 | sctlr_set) & !sctlr_clear`, and invalidates the TLB.
///
/// # Safety
///
/// `ttbr` must be the address of a valid level 1 table which maps the code that is currently
/// running, the stack, and everything else used afterwards, with correct attributes.
#[cfg(all(target_arch = "aarch64", not(test)))]
#[unsafe(naked)]
pub unsafe extern "C" fn enable_mmu(ttbr: usize, sctlr_set: u64, sctlr_clear: u64) {
    crate::naked_asm!(
        "tlbi	alle3

        ldr	x3, ={mair}
        msr	mair_el3, x3

        ldr	x3, ={tcr}
        msr	tcr_el3, x3

        msr	ttbr0_el3, x0

        dsb	sy
        isb

        mrs	x3, sctlr_el3

        orr	x3, x3, x1
        bic	x3, x3, x2

        msr	sctlr_el3, x3

        isb
        tlbi	alle3
        dsb	sy
        isb
        ret",
        mair = const MAIR.0,
        tcr = const TCR,
    )
}
