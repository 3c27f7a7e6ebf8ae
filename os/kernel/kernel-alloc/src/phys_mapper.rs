//! # Physical Memory Access
//!
//! [`PhysMapper`] implementations for the two places the process core runs:
//!
//! - [`KernelAliasMapper`]: on hardware, the boot code maps all RAM into the
//!   upper half at `VA_START + pa`, so a physical address becomes a pointer
//!   by adding the offset.
//! - `HostMemory` (feature `hosted`): a block of process memory standing in
//!   for a range of physical RAM, for host-side tests.

use kernel_info::memory::kernel_alias;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] through the kernel linear map.
///
/// # Safety
/// - The linear map must cover the referenced physical range.
/// - Only meaningful when running at EL1 with `TTBR1_EL1` installed.
#[derive(Copy, Clone, Debug, Default)]
pub struct KernelAliasMapper;

impl PhysMapper for KernelAliasMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = kernel_alias(pa).as_u64() as *mut T;
        unsafe { &mut *va }
    }
}

#[cfg(any(test, feature = "hosted"))]
pub use hosted::HostMemory;

#[cfg(any(test, feature = "hosted"))]
mod hosted {
    use core::cell::UnsafeCell;
    use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K};
    use kernel_vmem::PhysMapper;
    use std::sync::Arc;

    #[repr(C, align(4096))]
    struct Frame(UnsafeCell<[u8; Size4K::SIZE as usize]>);

    struct Ram {
        base: u64,
        frames: Vec<Frame>,
    }

    // Frames are only reached through `phys_to_mut`, whose contract forbids
    // aliasing references.
    unsafe impl Sync for Ram {}
    unsafe impl Send for Ram {}

    /// Simulated physical RAM covering `frames` frames from `base`.
    ///
    /// Cloning yields another handle to the same memory, the way every copy
    /// of [`KernelAliasMapper`](super::KernelAliasMapper) reaches the same RAM.
    #[derive(Clone)]
    pub struct HostMemory {
        ram: Arc<Ram>,
    }

    impl HostMemory {
        #[must_use]
        pub fn new(base: PhysicalAddress, frames: usize) -> Self {
            let frames = (0..frames)
                .map(|_| Frame(UnsafeCell::new([0; Size4K::SIZE as usize])))
                .collect();
            Self {
                ram: Arc::new(Ram {
                    base: base.page::<Size4K>().base().as_u64(),
                    frames,
                }),
            }
        }

        /// `true` if `pa` lies inside the simulated range.
        #[must_use]
        pub fn contains(&self, pa: PhysicalAddress) -> bool {
            self.locate(pa).is_some()
        }

        #[allow(clippy::cast_possible_truncation)]
        fn locate(&self, pa: PhysicalAddress) -> Option<(usize, usize)> {
            let offset = pa.as_u64().checked_sub(self.ram.base)?;
            let index = (offset >> Size4K::SHIFT) as usize;
            (index < self.ram.frames.len()).then_some((index, pa.offset::<Size4K>() as usize))
        }
    }

    impl PhysMapper for HostMemory {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let Some((index, offset)) = self.locate(pa) else {
                panic!("{pa:?} is outside simulated RAM");
            };
            assert!(
                offset + size_of::<T>() <= Size4K::SIZE as usize,
                "access at {pa:?} crosses a frame boundary"
            );
            let base = self.ram.frames[index].0.get().cast::<u8>();
            unsafe { &mut *base.add(offset).cast::<T>() }
        }
    }
}
