use crate::{MemoryAddress, PageSize, VirtualAddress};
use core::fmt;
use core::marker::PhantomData;

/// Virtual page base for size `S`.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage<S: PageSize> {
    base: MemoryAddress,
    _size: PhantomData<S>,
}

impl<S: PageSize> VirtualPage<S> {
    /// The page containing `va` (low bits dropped).
    #[inline]
    #[must_use]
    pub const fn from_addr(va: VirtualAddress) -> Self {
        Self {
            base: va.0.align_down::<S>(),
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress(self.base)
    }

    /// The page directly above this one.
    #[inline]
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.base.checked_add(S::SIZE) {
            Some(base) => Some(Self {
                base,
                _size: PhantomData,
            }),
            None => None,
        }
    }

    /// The page directly below this one.
    #[inline]
    #[must_use]
    pub const fn checked_prev(self) -> Option<Self> {
        match self.base.checked_sub(S::SIZE) {
            Some(base) => Some(Self {
                base,
                _size: PhantomData,
            }),
            None => None,
        }
    }
}

impl<S: PageSize> fmt::Debug for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:016X})", self.base.as_u64())
    }
}
