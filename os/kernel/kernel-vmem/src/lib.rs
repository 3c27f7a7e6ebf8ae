//! # Virtual Memory Support (AArch64)
//!
//! Minimal abstractions for building per-task translation tables with the
//! 4 KiB granule and a 48-bit user address space (`TTBR0_EL1`).
//!
//! ## Overview
//!
//! - [`FrameAlloc`]: source (and sink) of 4 KiB physical frames.
//! - [`PhysMapper`]: turns a physical frame into a reference the kernel can
//!   write through (the kernel linear map on hardware, a RAM simulation in
//!   host tests).
//! - [`descriptor`]: the raw 64-bit table/page descriptor.
//! - [`page_table`]: levels, validated indices and the 512-entry table.
//! - [`address_space`]: the per-task memory descriptor: lazy table creation,
//!   user page and guard page mappings, translation and teardown.
//! - [`fault_status`]: data fault status codes, as the MMU would report them.
//!
//! ## Walk
//!
//! ```text
//! VA[47:39] → L0 ─table→ VA[38:30] → L1 ─table→ VA[29:21] → L2 ─table→ VA[20:12] → L3 ─page→ frame
//! ```
//!
//! Intermediate tables are created on demand by
//! [`ensure_next_level`](address_space::ensure_next_level) and recorded in the
//! owning [`AddressSpace`] so that they can be freed with it. No table is
//! ever shared between two address spaces.
//!
//! ## Safety
//!
//! The only `unsafe` is the [`PhysMapper`] contract: the frames handed to the
//! walker must be table frames owned by the address space being walked.

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code)]

pub mod address_space;
pub mod descriptor;
pub mod fault_status;
pub mod page_table;

pub use crate::address_space::{AddressSpace, MapError, UserPage};
pub use crate::descriptor::{AccessPermissions, Descriptor, DescriptorKind};
pub use crate::fault_status::{Access, FaultStatus};
pub use crate::page_table::{PageTable, TableIndex, TableLevel};
pub use kernel_memory_addresses as addresses;

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Error returned when a frame is handed back that the allocator does not
/// consider allocated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FreeError {
    #[error("{0} is outside the frame pool")]
    OutOfRange(PhysicalAddress),
    #[error("{0} is already free")]
    DoubleFree(PhysicalAddress),
}

/// Source of **physical** 4 KiB frames for page tables and page contents.
///
/// Returned frames are page aligned and zero-filled. `None` means the pool is
/// exhausted.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;

    /// Return a frame obtained from [`alloc_4k`](Self::alloc_4k).
    ///
    /// # Errors
    /// [`FreeError`] if `frame` was not handed out by this allocator or has
    /// already been returned. The allocator state is left untouched.
    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) -> Result<(), FreeError>;
}

/// Converts physical addresses to usable references in the current virtual
/// address space.
///
/// - **Kernel**: adds the linear-map offset (`VA_START`).
/// - **Host tests**: indexes a simulated RAM buffer.
pub trait PhysMapper {
    /// Convert a *physical* address to a mutable reference.
    ///
    /// # Safety
    /// - `pa` must be backed by memory that is writable through this mapper.
    /// - The bytes at `pa` must be a valid `T` and must not be aliased by
    ///   another live reference for `'a`.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// Borrow the table in `page`.
///
/// # Safety
/// `page` must be a table frame reachable through `m`.
#[inline]
pub(crate) unsafe fn table_mut<'a, M: PhysMapper>(m: &M, page: PhysicalPage<Size4K>) -> &'a mut PageTable {
    unsafe { m.phys_to_mut::<PageTable>(page.base()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::UnsafeCell;
    use kernel_memory_addresses::VirtualAddress;

    /// A trivial **bump** allocator: always hands out the next 4 KiB frame.
    /// Frees are counted but never reused.
    struct BumpAlloc {
        next: u64,
        end: u64,
        freed: usize,
    }

    impl BumpAlloc {
        fn new(start: u64, end: u64) -> Self {
            Self {
                next: start,
                end,
                freed: 0,
            }
        }

        fn used(&self) -> u64 {
            self.next >> 12
        }
    }

    impl FrameAlloc for BumpAlloc {
        fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
            if self.next + 4096 > self.end {
                return None;
            }
            let p = self.next;
            self.next += 4096;
            Some(PhysicalPage::from_addr(PhysicalAddress::new(p)))
        }

        fn free_4k(&mut self, _frame: PhysicalPage<Size4K>) -> Result<(), FreeError> {
            self.freed += 1;
            Ok(())
        }
    }

    /// A 4 KiB-aligned raw frame. We use this as our "physical RAM" backing store in tests.
    #[repr(align(4096))]
    struct Aligned4K(UnsafeCell<[u8; 4096]>);

    /// A tiny in-memory "RAM": physical addresses are byte offsets from 0.
    struct TestPhys {
        frames: Vec<Aligned4K>,
    }

    impl TestPhys {
        fn with_frames(n: usize) -> Self {
            Self {
                frames: (0..n).map(|_| Aligned4K(UnsafeCell::new([0; 4096]))).collect(),
            }
        }
    }

    impl PhysMapper for TestPhys {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let idx = (pa.as_u64() >> 12) as usize;
            let off = (pa.as_u64() & 0xfff) as usize;
            let base = self.frames[idx].0.get().cast::<u8>();
            unsafe { &mut *base.add(off).cast::<T>() }
        }
    }

    fn frame(pa: u64) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(pa))
    }

    #[test]
    fn map_creates_four_tables_and_leaf() {
        let phys = TestPhys::with_frames(64);
        // Frame 0 stays reserved so that physical 0 is never a table.
        let mut alloc = BumpAlloc::new(0x1000, 64 << 12);
        let mut aspace = AddressSpace::new();

        let va = VirtualAddress::new(0x0000_0000_0040_0000);
        aspace.map(&phys, &mut alloc, va, frame(0x3F000)).unwrap();

        assert!(aspace.root().is_some());
        assert_eq!(aspace.table_page_count(), 4);
        assert_eq!(aspace.user_page_count(), 1);
        assert_eq!(alloc.used(), 5);
        assert_eq!(
            aspace.translate(&phys, va + 0x10),
            Some(PhysicalAddress::new(0x3F010))
        );
    }

    #[test]
    fn neighbouring_page_reuses_tables() {
        let phys = TestPhys::with_frames(64);
        let mut alloc = BumpAlloc::new(0x1000, 32 << 12);
        let mut aspace = AddressSpace::new();

        let va = VirtualAddress::new(0x0040_0000);
        aspace.map(&phys, &mut alloc, va, frame(0x3E000)).unwrap();
        aspace.map(&phys, &mut alloc, va + 0x1000, frame(0x3F000)).unwrap();

        assert_eq!(aspace.table_page_count(), 4);
        assert_eq!(aspace.user_page_count(), 2);
    }

    #[test]
    fn ensure_next_level_reports_creation_once() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0x1000, 16 << 12);
        let root = alloc.alloc_4k().unwrap();
        let va = VirtualAddress::new(0x1234_5000);

        let (a, created) = address_space::ensure_next_level(&phys, &mut alloc, root, TableLevel::L0, va).unwrap();
        assert!(created);
        let (b, created) = address_space::ensure_next_level(&phys, &mut alloc, root, TableLevel::L0, va).unwrap();
        assert!(!created);
        assert_eq!(a, b);
    }

    #[test]
    fn guard_faults_for_user_but_not_kernel() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0x1000, 16 << 12);
        let mut aspace = AddressSpace::new();
        let va = VirtualAddress::new(0x007F_E000);

        aspace.map_guard(&phys, &mut alloc, va).unwrap();

        assert!(aspace.is_guard(va + 8));
        assert_eq!(
            aspace.check_access(&phys, va, Access::USER_READ),
            Err(FaultStatus::Permission(TableLevel::L3))
        );
        assert_eq!(aspace.check_access(&phys, va, Access::KERNEL_READ), Ok(PhysicalAddress::zero()));
        assert_eq!(aspace.user_page_count(), 0);
    }

    #[test]
    fn check_access_reports_translation_level() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0x1000, 16 << 12);
        let mut aspace = AddressSpace::new();
        let va = VirtualAddress::new(0x0040_0000);

        assert_eq!(
            aspace.check_access(&phys, va, Access::USER_READ),
            Err(FaultStatus::Translation(TableLevel::L0))
        );
        aspace.map(&phys, &mut alloc, va, frame(0xF000)).unwrap();
        assert_eq!(
            aspace.check_access(&phys, va + 0x1000, Access::USER_WRITE),
            Err(FaultStatus::Translation(TableLevel::L3))
        );
        // A different 1 GiB slot fails one level further up.
        assert_eq!(
            aspace.check_access(&phys, VirtualAddress::new(0x4000_0000), Access::USER_READ),
            Err(FaultStatus::Translation(TableLevel::L1))
        );
    }

    #[test]
    fn double_map_is_rejected() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0x1000, 16 << 12);
        let mut aspace = AddressSpace::new();
        let va = VirtualAddress::new(0x0040_0000);

        aspace.map(&phys, &mut alloc, va, frame(0xE000)).unwrap();
        assert_eq!(
            aspace.map(&phys, &mut alloc, va, frame(0xF000)),
            Err(MapError::AlreadyMapped(va))
        );
        assert_eq!(aspace.user_page_count(), 1);
    }

    #[test]
    fn kernel_addresses_are_refused() {
        let phys = TestPhys::with_frames(8);
        let mut alloc = BumpAlloc::new(0x1000, 8 << 12);
        let mut aspace = AddressSpace::new();
        let va = VirtualAddress::new(info::VA_START);
        assert_eq!(
            aspace.map(&phys, &mut alloc, va, frame(0x2000)),
            Err(MapError::NotUserAddress(va))
        );
        assert!(aspace.root().is_none());
    }

    #[test]
    fn user_page_quota_is_enforced() {
        let phys = TestPhys::with_frames(64);
        let mut alloc = BumpAlloc::new(0x1000, 64 << 12);
        let mut aspace = AddressSpace::new();
        let limit = kernel_info::process::MAX_PROCESS_PAGES as u64;

        for i in 0..limit {
            let va = VirtualAddress::new(0x0040_0000 + i * 0x1000);
            aspace.map(&phys, &mut alloc, va, frame(0x30000)).unwrap();
        }
        let va = VirtualAddress::new(0x0040_0000 + limit * 0x1000);
        let err = aspace.map(&phys, &mut alloc, va, frame(0x30000)).unwrap_err();
        assert_eq!(err, MapError::UserPageQuota);
        assert!(err.is_exhaustion());
    }

    #[test]
    fn table_quota_is_checked_before_allocating() {
        let phys = TestPhys::with_frames(64);
        let mut alloc = BumpAlloc::new(0x1000, 64 << 12);
        let mut aspace = AddressSpace::new();

        // Every 512 GiB region needs three fresh tables below the root.
        let mut region = 0u64;
        let err = loop {
            let va = VirtualAddress::new(region << 39);
            if let Err(e) = aspace.map(&phys, &mut alloc, va, frame(0x30000)) {
                break e;
            }
            region += 1;
        };
        assert_eq!(err, MapError::TablePageQuota);
        let before = alloc.used();
        assert!(aspace.map(&phys, &mut alloc, VirtualAddress::new(region << 39), frame(0x30000)).is_err());
        assert_eq!(alloc.used(), before);
    }

    #[test]
    fn release_frees_pages_and_tables() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0x1000, 16 << 12);
        let mut aspace = AddressSpace::new();
        let va = VirtualAddress::new(0x0040_0000);
        aspace.map(&phys, &mut alloc, va, frame(0xF000)).unwrap();
        aspace.map_guard(&phys, &mut alloc, va + 0x1000).unwrap();

        aspace.release(&mut alloc).unwrap();
        assert_eq!(alloc.freed, 5);
        assert!(aspace.root().is_none());
        assert_eq!(aspace.guard_pages().count(), 0);
    }
}
