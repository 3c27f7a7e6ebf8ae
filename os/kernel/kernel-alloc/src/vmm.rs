//! Minimal Virtual Memory Manager (VMM) for the process core.
//!
//! Couples a [`PhysMapper`] with a [`FrameAlloc`] and offers the operations
//! process creation, the fault handler and the syscall layer need on a task's
//! [`AddressSpace`].
//!
//! # Example
//! ```ignore
//! use kernel_alloc::{KernelFrameAlloc, phys_mapper::KernelAliasMapper, vmm::Vmm};
//! let mut frames = KernelFrameAlloc::kernel_pool();
//! let mapper = KernelAliasMapper;
//! let mut vmm = Vmm::new(&mapper, &mut frames);
//! let stack = vmm.allocate_kernel_alias();
//! ```

use core::ptr::copy_nonoverlapping;
use kernel_info::memory::kernel_alias;
use kernel_memory_addresses::{PageSize, PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::{Access, AddressSpace, FaultStatus, FrameAlloc, FreeError, MapError, PhysMapper};
use log::debug;

/// Minimal virtual memory manager.
pub struct Vmm<'m, M: PhysMapper, A: FrameAlloc> {
    mapper: &'m M,
    alloc: &'m mut A,
}

impl<'m, M: PhysMapper, A: FrameAlloc> Vmm<'m, M, A> {
    pub const fn new(mapper: &'m M, alloc: &'m mut A) -> Self {
        Self { mapper, alloc }
    }

    /// Allocate a zeroed frame and return its kernel linear-map address.
    pub fn allocate_kernel_alias(&mut self) -> Option<VirtualAddress> {
        self.alloc.alloc_4k().map(|f| kernel_alias(f.base()))
    }

    /// Allocate a zeroed frame, map it at `va` in `aspace` and return its
    /// kernel linear-map address.
    ///
    /// # Errors
    /// - [`VmmError::OutOfMemory`] if no frame is left.
    /// - [`VmmError::Map`] if the mapping fails; the frame is returned to the
    ///   pool.
    pub fn allocate_user_backed(
        &mut self,
        aspace: &mut AddressSpace,
        va: VirtualAddress,
    ) -> Result<VirtualAddress, VmmError> {
        self.map_fresh(aspace, va).map(|f| kernel_alias(f.base()))
    }

    fn map_fresh(
        &mut self,
        aspace: &mut AddressSpace,
        va: VirtualAddress,
    ) -> Result<PhysicalPage<Size4K>, VmmError> {
        let frame = self.alloc.alloc_4k().ok_or(VmmError::OutOfMemory)?;
        if let Err(e) = aspace.map(self.mapper, self.alloc, va, frame) {
            self.alloc.free_4k(frame)?;
            return Err(e.into());
        }
        Ok(frame)
    }

    /// Give `dst` a private copy of every user page of `src` at the same
    /// virtual address, and the same guard pages.
    ///
    /// On error `dst` keeps whatever was copied so far; the caller releases it.
    ///
    /// # Errors
    /// Allocation and mapping failures, see [`allocate_user_backed`](Self::allocate_user_backed).
    pub fn copy_address_space(&mut self, src: &AddressSpace, dst: &mut AddressSpace) -> Result<(), VmmError> {
        for page in src.user_pages() {
            let copy = self.map_fresh(dst, page.virt.base())?;
            unsafe {
                let from = self.mapper.phys_to_mut::<[u8; Size4K::SIZE as usize]>(page.phys.base());
                let to = self.mapper.phys_to_mut::<[u8; Size4K::SIZE as usize]>(copy.base());
                copy_nonoverlapping(from.as_ptr(), to.as_mut_ptr(), from.len());
            }
        }
        for guard in src.guard_pages() {
            dst.map_guard(self.mapper, self.alloc, guard.base())?;
        }
        debug!(
            "copied {} pages, {} guards",
            dst.user_page_count(),
            dst.guard_pages().count()
        );
        Ok(())
    }

    /// Return every frame owned by `aspace` to the pool.
    ///
    /// # Errors
    /// [`VmmError::Free`] if the pool did not consider a frame allocated.
    pub fn release(&mut self, aspace: &mut AddressSpace) -> Result<(), VmmError> {
        Ok(aspace.release(self.alloc)?)
    }

    /// Map a fresh frame at the page containing `va`, for demand paging.
    ///
    /// # Errors
    /// See [`allocate_user_backed`](Self::allocate_user_backed).
    pub fn map_demand_page(&mut self, aspace: &mut AddressSpace, va: VirtualAddress) -> Result<(), VmmError> {
        self.map_fresh(aspace, va.page::<Size4K>().base()).map(|_| ())
    }

    /// Length of the NUL-terminated string at `va` in `aspace`, looking at no
    /// more than `limit` bytes and reading with EL0 permissions.
    ///
    /// # Errors
    /// - [`VmmError::UserFault`] if a byte is not readable from EL0.
    /// - [`VmmError::Unterminated`] if no NUL is found within `limit` bytes.
    pub fn user_str_len(&self, aspace: &AddressSpace, va: VirtualAddress, limit: usize) -> Result<usize, VmmError> {
        for i in 0..limit {
            if self.user_byte(aspace, va, i)? == 0 {
                return Ok(i);
            }
        }
        Err(VmmError::Unterminated)
    }

    /// Fill `buf` from `va` in `aspace` with EL0 permissions.
    ///
    /// # Errors
    /// [`VmmError::UserFault`] at the first byte not readable from EL0.
    pub fn read_user(&self, aspace: &AddressSpace, va: VirtualAddress, buf: &mut [u8]) -> Result<(), VmmError> {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.user_byte(aspace, va, i)?;
        }
        Ok(())
    }

    /// Copy the NUL-terminated string at `va` in `aspace` into `buf`, reading
    /// with EL0 permissions. Returns the string length.
    ///
    /// # Errors
    /// See [`user_str_len`](Self::user_str_len); the limit is `buf.len()`.
    pub fn read_user_str(
        &self,
        aspace: &AddressSpace,
        va: VirtualAddress,
        buf: &mut [u8],
    ) -> Result<usize, VmmError> {
        let len = self.user_str_len(aspace, va, buf.len())?;
        self.read_user(aspace, va, &mut buf[..len])?;
        Ok(len)
    }

    fn user_byte(&self, aspace: &AddressSpace, va: VirtualAddress, offset: usize) -> Result<u8, VmmError> {
        let at = VirtualAddress::new(va.as_u64().wrapping_add(offset as u64));
        let pa = aspace
            .check_access(self.mapper, at, Access::USER_READ)
            .map_err(|status| VmmError::UserFault(at, status))?;
        Ok(unsafe { *self.mapper.phys_to_mut::<u8>(pa) })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmmError {
    #[error("out of memory")]
    OutOfMemory,
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Free(#[from] FreeError),
    #[error("user access at {0} faulted: {1}")]
    UserFault(VirtualAddress, FaultStatus),
    #[error("unterminated user string")]
    Unterminated,
}

impl VmmError {
    /// `true` if the request failed for lack of frames or bookkeeping room.
    #[must_use]
    pub const fn is_exhaustion(self) -> bool {
        match self {
            Self::OutOfMemory => true,
            Self::Map(e) => e.is_exhaustion(),
            Self::Free(_) | Self::UserFault(..) | Self::Unterminated => false,
        }
    }
}
