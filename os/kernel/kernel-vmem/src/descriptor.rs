//! # AArch64 Translation Table Descriptor (4 KiB granule)
//!
//! One 64-bit entry, valid at every level. The meaning of bit 1 depends on
//! the level:
//!
//! | Level | bit 1 = 0 | bit 1 = 1 |
//! |-------|-----------|-----------|
//! | L0–L2 | block (unused here) | next-level table |
//! | L3    | reserved  | 4 KiB page |
//!
//! ### Bit layout (stage 1, lower attributes for page/block)
//!
//! | Bits  | Name       | Meaning |
//! |-------|------------|---------|
//! | 0     | `valid`    | Entry is valid |
//! | 1     | `table`    | Table (L0–L2) / page (L3) |
//! | 2–4   | `AttrIndx` | Index into `MAIR_EL1` |
//! | 5     | `NS`       | Non-secure |
//! | 6–7   | `AP[2:1]`  | Access permissions |
//! | 8–9   | `SH`       | Shareability |
//! | 10    | `AF`       | Access flag |
//! | 11    | `nG`       | Not global |
//! | 12–47 | `OA`       | Output address bits `[47:12]` |
//! | 52    | `Contig`   | Contiguous hint |
//! | 53    | `PXN`      | Privileged execute never |
//! | 54    | `UXN`      | Unprivileged execute never |
//! | 55–58 | software   | Ignored by hardware |

use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

use crate::page_table::TableLevel;

/// `MAIR_EL1` slot holding normal, non-cacheable memory.
pub const MT_NORMAL_NC: u8 = 1;

/// Access permission field `AP[2:1]`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum AccessPermissions {
    /// EL1 read/write, no EL0 access.
    KernelReadWrite = 0b00,
    /// EL1 and EL0 read/write.
    UserReadWrite = 0b01,
    /// EL1 read-only, no EL0 access.
    KernelReadOnly = 0b10,
    /// EL1 and EL0 read-only.
    UserReadOnly = 0b11,
}

impl AccessPermissions {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::KernelReadWrite,
            0b01 => Self::UserReadWrite,
            0b10 => Self::KernelReadOnly,
            _ => Self::UserReadOnly,
        }
    }

    /// Whether an access with the given privilege and direction is allowed.
    #[inline]
    #[must_use]
    pub const fn permits(self, el0: bool, write: bool) -> bool {
        match self {
            Self::KernelReadWrite => !el0,
            Self::UserReadWrite => true,
            Self::KernelReadOnly => !el0 && !write,
            Self::UserReadOnly => !write,
        }
    }
}

/// Raw translation table descriptor.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Descriptor {
    /// Valid (bit 0).
    pub valid: bool,

    /// Table (L0–L2) or page (L3) descriptor type (bit 1).
    pub table_or_page: bool,

    /// Memory attribute index into `MAIR_EL1` (bits 2..=4).
    #[bits(3)]
    pub attr_index: u8,

    /// Non-secure (bit 5).
    pub non_secure: bool,

    /// Access permissions (bits 6..=7).
    #[bits(2)]
    pub access_permissions: AccessPermissions,

    /// Shareability (bits 8..=9).
    #[bits(2)]
    pub shareability: u8,

    /// Access flag (bit 10). A clear flag traps the first access.
    pub access_flag: bool,

    /// Not global (bit 11).
    pub not_global: bool,

    /// Output address bits `[47:12]`.
    #[bits(36)]
    output_bits_47_12: u64,

    #[bits(4)]
    __: u8,

    /// Contiguous hint (bit 52).
    pub contiguous: bool,

    /// Privileged execute never (bit 53).
    pub pxn: bool,

    /// Unprivileged execute never (bit 54).
    pub uxn: bool,

    /// Software use (bits 55..=58).
    #[bits(4)]
    pub software: u8,

    #[bits(5)]
    __: u8,
}

/// Decoded view of a [`Descriptor`] at a known level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DescriptorKind {
    /// Not valid; any access faults with a translation fault at this level.
    Invalid,
    /// Points to the next-level table (L0–L2 only).
    Table(PhysicalPage<Size4K>),
    /// Maps a 4 KiB page (L3 only).
    Page(PhysicalPage<Size4K>, AccessPermissions),
    /// Block mapping at L0–L2, or a reserved encoding at L3.
    Unsupported,
}

impl Descriptor {
    /// An invalid (all-zero) entry.
    #[inline]
    #[must_use]
    pub const fn invalid() -> Self {
        Self::new()
    }

    /// An intermediate entry pointing at `next`.
    #[inline]
    #[must_use]
    pub const fn table(next: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_valid(true)
            .with_table_or_page(true)
            .with_output_address(next.base())
    }

    /// A leaf mapping `frame` read/write for EL0 and EL1.
    #[inline]
    #[must_use]
    pub const fn user_page(frame: PhysicalPage<Size4K>) -> Self {
        Self::page(frame, AccessPermissions::UserReadWrite)
    }

    /// A leaf targeting physical 0 that EL0 may not touch.
    #[inline]
    #[must_use]
    pub const fn guard() -> Self {
        Self::page(
            PhysicalPage::from_addr(PhysicalAddress::zero()),
            AccessPermissions::KernelReadWrite,
        )
    }

    #[inline]
    #[must_use]
    const fn page(frame: PhysicalPage<Size4K>, ap: AccessPermissions) -> Self {
        Self::new()
            .with_valid(true)
            .with_table_or_page(true)
            .with_attr_index(MT_NORMAL_NC)
            .with_access_permissions(ap)
            .with_access_flag(true)
            .with_output_address(frame.base())
    }

    #[inline]
    #[must_use]
    pub const fn output_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.output_bits_47_12() << 12)
    }

    #[inline]
    #[must_use]
    pub const fn with_output_address(self, pa: PhysicalAddress) -> Self {
        self.with_output_bits_47_12(pa.as_u64() >> 12)
    }

    /// Interpret this entry as found in a table of `level`.
    #[must_use]
    pub const fn kind(self, level: TableLevel) -> DescriptorKind {
        if !self.valid() {
            return DescriptorKind::Invalid;
        }
        let target = PhysicalPage::from_addr(self.output_address());
        match (level.is_leaf(), self.table_or_page()) {
            (false, true) => DescriptorKind::Table(target),
            (true, true) => DescriptorKind::Page(target, self.access_permissions()),
            (_, false) => DescriptorKind::Unsupported,
        }
    }
}
