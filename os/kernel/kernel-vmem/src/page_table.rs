//! # Translation Tables
//!
//! [`TableLevel`] names the four lookup levels of a 48-bit, 4 KiB-granule
//! walk; [`TableIndex`] is the validated slot index a [`VirtualAddress`]
//! selects at a given level; [`PageTable`] is one 4 KiB table of 512
//! [`Descriptor`]s.

use kernel_info::memory::{L0_SHIFT, L1_SHIFT, L2_SHIFT, L3_SHIFT, PTRS_PER_TABLE};
use kernel_memory_addresses::VirtualAddress;

use crate::descriptor::Descriptor;

/// A level of the translation walk, root first.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TableLevel {
    /// Root table, VA bits `[47:39]`.
    L0,
    /// VA bits `[38:30]`.
    L1,
    /// VA bits `[29:21]`.
    L2,
    /// Leaf table, VA bits `[20:12]`.
    L3,
}

impl TableLevel {
    /// All levels, root first.
    pub const WALK: [Self; 4] = [Self::L0, Self::L1, Self::L2, Self::L3];

    /// Shift of the VA bits indexing this level.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::L0 => L0_SHIFT,
            Self::L1 => L1_SHIFT,
            Self::L2 => L2_SHIFT,
            Self::L3 => L3_SHIFT,
        }
    }

    /// The level below this one, `None` at the leaf level.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::L0 => Some(Self::L1),
            Self::L1 => Some(Self::L2),
            Self::L2 => Some(Self::L3),
            Self::L3 => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::L3)
    }

    /// Numeric level as reported in fault status codes.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Slot selected by `va` in a table of this level.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index_of(self, va: VirtualAddress) -> TableIndex {
        TableIndex::new(((va.as_u64() >> self.shift()) as usize) & (PTRS_PER_TABLE - 1))
    }
}

/// Slot index into a [`PageTable`]. Range is `0..512`.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// ### Debug assertions
    /// - Asserts `v < 512` in debug builds.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(v: usize) -> Self {
        debug_assert!(v < PTRS_PER_TABLE);
        Self((v & (PTRS_PER_TABLE - 1)) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Indices of `va` at every level, root first.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> [TableIndex; 4] {
    [
        TableLevel::L0.index_of(va),
        TableLevel::L1.index_of(va),
        TableLevel::L2.index_of(va),
        TableLevel::L3.index_of(va),
    ]
}

/// One translation table: 512 descriptors, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [Descriptor; PTRS_PER_TABLE],
}

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> Descriptor {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: Descriptor) {
        self.entries[i.as_usize()] = e;
    }

    /// Invalidate every entry.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(Descriptor::invalid());
    }
}

const _: () = assert!(size_of::<PageTable>() == 4096);
