//! # Data Fault Status Codes
//!
//! The outcome of an access that the MMU would refuse, encoded the way
//! `ESR_EL1.ISS.DFSC` reports it. [`AddressSpace::check_access`](crate::AddressSpace::check_access)
//! produces these so that host tests can check what the hardware would do.

use crate::page_table::TableLevel;

/// Fault class bits of a DFSC (`DFSC & 0x3C`).
pub const DFSC_TYPE_MASK: u8 = 0x3C;
/// Level bits of a DFSC.
pub const DFSC_LEVEL_MASK: u8 = 0x03;
/// Translation fault class.
pub const DFSC_TRANSLATION: u8 = 0x04;
/// Access flag fault class.
pub const DFSC_ACCESS_FLAG: u8 = 0x08;
/// Permission fault class.
pub const DFSC_PERMISSION: u8 = 0x0C;

/// A kind of memory access.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Access {
    /// The access comes from EL0.
    pub el0: bool,
    /// The access is a write.
    pub write: bool,
}

impl Access {
    pub const USER_READ: Self = Self {
        el0: true,
        write: false,
    };
    pub const USER_WRITE: Self = Self {
        el0: true,
        write: true,
    };
    pub const KERNEL_READ: Self = Self {
        el0: false,
        write: false,
    };
}

/// Why a translation did not produce an address.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FaultStatus {
    #[error("translation fault, level {}", .0.as_u8())]
    Translation(TableLevel),
    #[error("access flag fault, level {}", .0.as_u8())]
    AccessFlag(TableLevel),
    #[error("permission fault, level {}", .0.as_u8())]
    Permission(TableLevel),
    #[error("unsupported descriptor, level {}", .0.as_u8())]
    Unsupported(TableLevel),
}

impl FaultStatus {
    /// The DFSC value the hardware would report.
    #[must_use]
    pub const fn dfsc(self) -> u8 {
        match self {
            Self::Translation(l) => DFSC_TRANSLATION | l.as_u8(),
            Self::AccessFlag(l) => DFSC_ACCESS_FLAG | l.as_u8(),
            Self::Permission(l) => DFSC_PERMISSION | l.as_u8(),
            Self::Unsupported(_) => DFSC_TRANSLATION,
        }
    }

    /// The level the walk stopped at.
    #[must_use]
    pub const fn level(self) -> TableLevel {
        match self {
            Self::Translation(l) | Self::AccessFlag(l) | Self::Permission(l) | Self::Unsupported(l) => l,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dfsc_encodes_class_and_level() {
        assert_eq!(FaultStatus::Translation(TableLevel::L2).dfsc(), 0x06);
        assert_eq!(FaultStatus::Permission(TableLevel::L3).dfsc(), 0x0F);
        assert_eq!(FaultStatus::Permission(TableLevel::L3).dfsc() & DFSC_TYPE_MASK, DFSC_PERMISSION);
        assert_eq!(FaultStatus::AccessFlag(TableLevel::L1).dfsc() & DFSC_LEVEL_MASK, 1);
    }
}
