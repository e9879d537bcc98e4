// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Static tables of every region the secure monitor maps, and the addresses derived from them.
//!
//! Each table is declared once with [`define_region_table!`], which generates both the identifier
//! enum and the ordered list of [`MappingRegion`]s, so an identifier always indexes its own record.

use crate::pagetable::{
    MT_CODE, MT_DEVICE, MT_DEVICE_NS, MT_MEMORY, MT_NS_MEMORY_XN, MT_RW_DATA, PAGE_SIZE,
};
use aarch64_paging::descriptor::Attributes;

/// Whether a region is installed as level 1 blocks or level 3 pages.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Granularity {
    /// 1 GiB level 1 block descriptors.
    Block,
    /// 4 KiB level 3 page descriptors.
    Page,
}

/// A physical range to map, with the attributes it is mapped with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MappingRegion {
    /// Physical base address.
    pub base: usize,
    /// Size in bytes.
    pub size: usize,
    /// Descriptor attributes, without the descriptor type bits.
    pub attributes: Attributes,
    /// Block or page granularity.
    pub granularity: Granularity,
}

impl MappingRegion {
    /// Creates a new mapping region record.
    pub const fn new(
        base: usize,
        size: usize,
        attributes: Attributes,
        granularity: Granularity,
    ) -> Self {
        Self {
            base,
            size,
            attributes,
            granularity,
        }
    }
}

/// How the virtual addresses of the regions of a table are laid out.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Placement {
    /// Every region is mapped at its physical address.
    Identity,
    /// Regions are packed one after the other from `base`, each followed by `guard` unmapped bytes.
    Packed {
        /// Virtual address of the first region.
        base: usize,
        /// Unmapped gap after each region.
        guard: usize,
    },
    /// Region `n` is mapped at `base + n * stride`.
    Strided {
        /// Virtual address of the first region.
        base: usize,
        /// Distance between the starts of consecutive regions.
        stride: usize,
    },
}

/// An ordered table of regions sharing a placement policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegionTable {
    /// Name used in logs.
    pub name: &'static str,
    /// How virtual addresses are assigned.
    pub placement: Placement,
    /// The regions, in installation order.
    pub regions: &'static [MappingRegion],
}

impl RegionTable {
    /// Returns the virtual address at which the region with the given index is mapped.
    pub const fn virtual_address(&self, index: usize) -> usize {
        match self.placement {
            Placement::Identity => self.regions[index].base,
            Placement::Strided { base, stride } => base + index * stride,
            Placement::Packed { base, guard } => {
                let mut va = base;
                let mut i = 0;
                while i < index {
                    va += self.regions[i].size + guard;
                    i += 1;
                }
                va
            }
        }
    }
}

/// Declares an identifier enum together with the region table it indexes.
macro_rules! define_region_table {
    (
        $(#[$attributes:meta])*
        $table:ident: $id:ident = $placement:expr,
        [$($(#[$variant_attributes:meta])* $variant:ident => ($base:expr, $size:expr, $mt:expr, $granularity:ident)),* $(,)?]
    ) => {
        $(#[$attributes])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq)]
        #[repr(usize)]
        // Not every table has a user for each of its identifiers.
        #[allow(unused)]
        pub enum $id {
            $($(#[$variant_attributes])* $variant,)*
        }

        #[allow(unused)]
        impl $id {
            /// All identifiers, in table order.
            pub const ALL: &[Self] = &[$(Self::$variant),*];

            /// Returns the record of this region.
            pub const fn region(self) -> MappingRegion {
                $table.regions[self as usize]
            }

            /// Returns the physical base address of this region.
            pub const fn physical_address(self) -> usize {
                self.region().base
            }

            /// Returns the size in bytes of this region.
            pub const fn size(self) -> usize {
                self.region().size
            }

            /// Returns the virtual address this region is mapped at.
            pub const fn virtual_address(self) -> usize {
                $table.virtual_address(self as usize)
            }
        }

        #[doc = concat!("Regions indexed by [`", stringify!($id), "`].")]
        pub const $table: RegionTable = RegionTable {
            name: stringify!($id),
            placement: $placement,
            regions: &[$(MappingRegion::new($base, $size, $mt, Granularity::$granularity)),*],
        };
    };
}

/// Physical base of the TZRAM carve-out owned by the secure monitor.
pub const TZRAM_PHYSICAL_BASE: usize = 0x7C01_0000;
/// Size of the TZRAM carve-out.
pub const TZRAM_SIZE: usize = 0x1_0000;

/// Virtual base of the MMIO device windows.
pub const MMIO_BASE: usize = 0x1_F008_0000;
/// Unmapped gap left after every device window.
pub const MMIO_GUARD_SIZE: usize = PAGE_SIZE;
/// Virtual base of the low-power-entry RAM segments.
pub const LP0_ENTRY_RAM_SEGMENT_BASE: usize = MMIO_BASE + 0x10_0000;
/// Distance between consecutive low-power-entry RAM segments.
pub const LP0_ENTRY_RAM_SEGMENT_STRIDE: usize = 0x1_0000;
/// Virtual base of the warm-boot RAM segments.
pub const WARMBOOT_RAM_SEGMENT_BASE: usize = LP0_ENTRY_RAM_SEGMENT_BASE + 0x4_7000;
/// Virtual base of the TZRAM segments.
pub const TZRAM_SEGMENT_BASE: usize = MMIO_BASE + 0x16_0000;

define_region_table!(
    /// Regions mapped with virtual address equal to physical address.
    IDENTITY_MAPPINGS: IdentityMapping = Placement::Identity,
    [
        /// iRAM C and D, from which the cold-boot code runs.
        Iram => (0x4002_0000, 0x2_0000, MT_MEMORY, Page),
        /// TZRAM, so code keeps running across the MMU enable.
        Tzram => (TZRAM_PHYSICAL_BASE, TZRAM_SIZE, MT_MEMORY, Page),
        /// Non-secure DRAM.
        Dram => (0x8000_0000, 0x1_0000_0000, MT_NS_MEMORY_XN, Block),
    ]
);

define_region_table!(
    /// Memory-mapped devices, each in its own window followed by a guard page.
    MMIO_DEVICES: MmioDevice = Placement::Packed {
        base: MMIO_BASE,
        guard: MMIO_GUARD_SIZE,
    },
    [
        /// ARM interrupt distributor.
        Gicd => (0x5004_1000, 0x1000, MT_DEVICE, Page),
        /// ARM interrupt controller physical CPU interface.
        Gicc => (0x5004_2000, 0x2000, MT_DEVICE, Page),
        /// UART-A.
        Uart => (0x7000_6000, 0x1000, MT_DEVICE_NS, Page),
        /// Clock and reset controller.
        ClkRst => (0x6000_6000, 0x1000, MT_DEVICE_NS, Page),
        /// RTC and power management controller.
        RtcPmc => (0x7000_E000, 0x1000, MT_DEVICE, Page),
        /// Timers, including TIMERUS.
        Timers => (0x6000_5000, 0x1000, MT_DEVICE, Page),
        /// System registers.
        SystemRegisters => (0x6000_C000, 0x1000, MT_DEVICE, Page),
        /// Security engine.
        SecurityEngine => (0x7001_2000, 0x2000, MT_DEVICE, Page),
        /// System counter.
        SysCtr0 => (0x700F_0000, 0x1000, MT_DEVICE, Page),
        /// Memory controller.
        MemoryController => (0x7001_9000, 0x1000, MT_DEVICE, Page),
        /// Fuses.
        Fuse => (0x7000_F000, 0x1000, MT_DEVICE, Page),
        /// Miscellaneous registers.
        Misc => (0x7000_0000, 0x4000, MT_DEVICE, Page),
        /// Flow controller.
        FlowController => (0x6000_7000, 0x1000, MT_DEVICE, Page),
        /// Bootloader mailbox page.
        BootloaderMailbox => (0x4000_2000, 0x1000, MT_DEVICE, Page),
        /// I2C-5 and I2C-6.
        I2c5 => (0x7000_D000, 0x1000, MT_DEVICE, Page),
        /// GPIO controllers.
        Gpio => (0x6000_D000, 0x1000, MT_DEVICE, Page),
        /// I2C-1 to I2C-4.
        I2c => (0x7000_C000, 0x1000, MT_DEVICE, Page),
        /// Exception vectors of the boot and power management processor.
        ExceptionVectors => (0x6000_F000, 0x1000, MT_DEVICE, Page),
        /// External memory controller, broadcast registers.
        Emc => (0x7001_B000, 0x1000, MT_DEVICE, Page),
        /// External memory controller, channel 0.
        Emc0 => (0x7001_E000, 0x1000, MT_DEVICE, Page),
        /// External memory controller, channel 1.
        Emc1 => (0x7001_F000, 0x1000, MT_DEVICE, Page),
    ]
);

define_region_table!(
    /// RAM used only while entering the LP0 sleep state.
    LP0_ENTRY_RAM_SEGMENTS: Lp0EntryRamSegment = Placement::Strided {
        base: LP0_ENTRY_RAM_SEGMENT_BASE,
        stride: LP0_ENTRY_RAM_SEGMENT_STRIDE,
    },
    [
        /// Encrypted copy of TZRAM.
        EncryptedTzram => (0x4002_0000, 0x1_0000, MT_DEVICE_NS, Page),
        /// LP0 entry code.
        EntryCode => (0x4000_3000, 0x1000, MT_DEVICE_NS, Page),
        /// TZRAM itself, for saving.
        Tzram => (TZRAM_PHYSICAL_BASE, TZRAM_SIZE, MT_DEVICE, Page),
    ]
);

define_region_table!(
    /// RAM handed to the warm-boot firmware.
    WARMBOOT_RAM_SEGMENTS: WarmbootRamSegment = Placement::Packed {
        base: WARMBOOT_RAM_SEGMENT_BASE,
        guard: 0,
    },
    [
        /// Encrypted security engine state for the boot ROM.
        EncryptedSeState => (0x8000_F000, 0x1000, MT_DEVICE_NS, Page),
        /// Encrypted TZRAM for the warm-boot firmware.
        EncryptedTzram => (0x8001_0000, 0x1_0000, MT_DEVICE_NS, Page),
    ]
);

define_region_table!(
    /// Fixed segments of TZRAM.
    TZRAM_SEGMENTS: TzramSegment = Placement::Packed {
        base: TZRAM_SEGMENT_BASE,
        guard: 0,
    },
    [
        /// Warm-boot entry code.
        WarmbootCrt0 => (TZRAM_PHYSICAL_BASE, 0x2000, MT_CODE, Page),
        /// Package2 loader.
        Pk2ldr => (TZRAM_PHYSICAL_BASE + 0x2000, 0x2000, MT_CODE, Page),
        /// Main monitor code and data.
        MainCode => (TZRAM_PHYSICAL_BASE + 0x4000, 0x6000, MT_CODE, Page),
        /// Exception vectors, with the L1 translation table in their last 64 bytes.
        SecmonEvt => (TZRAM_PHYSICAL_BASE + 0xA000, 0x1000, MT_CODE, Page),
        /// Stacks of cores 0 to 2, and the power-down stack.
        Core012Stacks => (TZRAM_PHYSICAL_BASE + 0xB000, 0x1000, MT_RW_DATA, Page),
        /// Stack of core 3.
        Core3Stack => (TZRAM_PHYSICAL_BASE + 0xC000, 0x1000, MT_RW_DATA, Page),
        /// Level 2 translation table.
        L2TranslationTable => (TZRAM_PHYSICAL_BASE + 0xD000, 0x1000, MT_RW_DATA, Page),
        /// Level 3 translation table.
        L3TranslationTable => (TZRAM_PHYSICAL_BASE + 0xE000, 0x1000, MT_RW_DATA, Page),
        /// Core coordination memory.
        CoreContexts => (TZRAM_PHYSICAL_BASE + 0xF000, 0x1000, MT_RW_DATA, Page),
    ]
);

/// Physical address of the 8-entry level 1 table, at the end of the first half of the exception
/// vector segment.
pub const L1_TABLE_PHYSICAL_ADDRESS: usize = TzramSegment::SecmonEvt.physical_address() + 0x800 - 64;

/// The five region tables, in installation order.
#[derive(Clone, Copy, Debug)]
pub struct AddressSpaceLayout {
    /// Identity mappings.
    pub identity: RegionTable,
    /// MMIO device windows.
    pub mmio_devices: RegionTable,
    /// Low-power-entry RAM segments.
    pub lp0_entry_segments: RegionTable,
    /// Warm-boot RAM segments.
    pub warmboot_segments: RegionTable,
    /// TZRAM segments.
    pub tzram_segments: RegionTable,
}

impl AddressSpaceLayout {
    /// Returns the tables in the order they must be installed.
    pub const fn tables(&self) -> [&RegionTable; 5] {
        [
            &self.identity,
            &self.mmio_devices,
            &self.lp0_entry_segments,
            &self.warmboot_segments,
            &self.tzram_segments,
        ]
    }
}

/// The secure monitor's address space.
pub const SECMON_LAYOUT: AddressSpaceLayout = AddressSpaceLayout {
    identity: IDENTITY_MAPPINGS,
    mmio_devices: MMIO_DEVICES,
    lp0_entry_segments: LP0_ENTRY_RAM_SEGMENTS,
    warmboot_segments: WARMBOOT_RAM_SEGMENTS,
    tzram_segments: TZRAM_SEGMENTS,
};

const _: () = {
    let mut size = 0;
    let mut i = 0;
    while i < TZRAM_SEGMENTS.regions.len() {
        assert!(TZRAM_SEGMENTS.regions[i].base == TZRAM_PHYSICAL_BASE + size);
        size += TZRAM_SEGMENTS.regions[i].size;
        i += 1;
    }
    assert!(size == TZRAM_SIZE, "TZRAM segments must cover TZRAM exactly");
};
