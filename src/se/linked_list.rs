// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! DMA descriptor lists read by the security engine.

use zerocopy::{FromBytes, Immutable, KnownLayout};

/// A single contiguous buffer, by physical address.
#[derive(Clone, Copy, Debug, Default, Eq, FromBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
pub struct LinkedListEntry {
    /// Physical address of the buffer.
    pub address: u32,
    /// Size of the buffer in bytes.
    pub size: u32,
}

impl LinkedListEntry {
    /// An entry describing no buffer at all.
    pub const EMPTY: Self = Self {
        address: 0,
        size: 0,
    };
}

/// A list of buffers, in the layout the engine expects.
///
/// The first word holds the index of the last entry rather than the number of entries.
#[derive(Clone, Debug, Eq, FromBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
pub struct LinkedList<const N: usize> {
    last_index: u32,
    entries: [LinkedListEntry; N],
}

impl<const N: usize> LinkedList<N> {
    const NON_EMPTY: () = assert!(N > 0);

    /// Creates a list of the given entries.
    pub const fn new(entries: [LinkedListEntry; N]) -> Self {
        let () = Self::NON_EMPTY;
        Self {
            last_index: (N - 1) as u32,
            entries,
        }
    }

    /// Returns the entries of the list, in the order the engine walks them.
    #[cfg(test)]
    pub fn entries(&self) -> &[LinkedListEntry] {
        &self.entries
    }
}

impl LinkedList<1> {
    /// Creates a list with a single buffer.
    pub const fn single(address: u32, size: u32) -> Self {
        Self::new([LinkedListEntry { address, size }])
    }

    /// A list describing no buffer, used as the output of operations which produce none in memory.
    pub const EMPTY: Self = Self::new([LinkedListEntry::EMPTY]);
}
