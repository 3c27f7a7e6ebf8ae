//! Bitmap-backed physical frame allocator.
//!
//! One bit per 4 KiB frame of a contiguous physical region, lowest free frame
//! (or run of frames, for kernel stacks) first. Frames are zero-filled through the allocator's [`PhysMapper`]
//! before they are handed out.

use crate::phys_mapper::KernelAliasMapper;
use kernel_info::memory::{LOW_MEMORY, PAGING_BITMAP_WORDS, PAGING_PAGES};
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::{FrameAlloc, FreeError, PhysMapper};
use log::{debug, warn};

/// The allocator for the kernel's frame pool, `[LOW_MEMORY, HIGH_MEMORY)`.
pub type KernelFrameAlloc = BitmapFrameAlloc<KernelAliasMapper, PAGING_BITMAP_WORDS>;

impl KernelFrameAlloc {
    /// The allocator covering the whole frame pool.
    #[must_use]
    pub const fn kernel_pool() -> Self {
        Self::new(KernelAliasMapper, PhysicalAddress::new(LOW_MEMORY), PAGING_PAGES)
    }
}

/// First-fit frame allocator over `frames` frames starting at `base`,
/// tracked in `WORDS` bitmap words.
pub struct BitmapFrameAlloc<M: PhysMapper, const WORDS: usize> {
    mapper: M,
    base: PhysicalAddress,
    frames: usize,
    used: usize,
    bitmap: [u64; WORDS],
}

impl<M: PhysMapper, const WORDS: usize> BitmapFrameAlloc<M, WORDS> {
    /// Manage `frames` frames starting at `base`. `base` is rounded down to a
    /// frame boundary; `frames` is clamped to what `WORDS` bitmap words track.
    #[must_use]
    pub const fn new(mapper: M, base: PhysicalAddress, frames: usize) -> Self {
        let capacity = WORDS * 64;
        Self {
            mapper,
            base: base.page::<Size4K>().base(),
            frames: if frames < capacity { frames } else { capacity },
            used: 0,
            bitmap: [0; WORDS],
        }
    }

    /// The mapper used to reach frame contents.
    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Total number of frames in the pool.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.frames
    }

    #[inline]
    #[must_use]
    pub const fn used_frames(&self) -> usize {
        self.used
    }

    #[inline]
    #[must_use]
    pub const fn free_frames(&self) -> usize {
        self.frames - self.used
    }

    /// Allocate the lowest free frame and zero it.
    pub fn allocate(&mut self) -> Option<PhysicalPage<Size4K>> {
        let Some(index) = self.first_free() else {
            warn!("frame pool exhausted ({} frames)", self.frames);
            return None;
        };
        self.claim(index);
        let frame = self.frame_at(index);
        debug!("allocated frame {:?}", frame.base());
        Some(frame)
    }

    /// Allocate the lowest run of `count` physically contiguous free frames,
    /// zero them and return the first.
    pub fn allocate_contiguous(&mut self, count: usize) -> Option<PhysicalPage<Size4K>> {
        let Some(start) = self.first_free_run(count) else {
            warn!("no run of {count} free frames ({} of {} used)", self.used, self.frames);
            return None;
        };
        for index in start..start + count {
            self.claim(index);
        }
        let first = self.frame_at(start);
        debug!("allocated {count} frames from {:?}", first.base());
        Some(first)
    }

    /// Release the frame containing `pa`.
    ///
    /// # Errors
    /// - [`FreeError::OutOfRange`] if `pa` is not inside the pool.
    /// - [`FreeError::DoubleFree`] if the frame is not allocated.
    pub fn free(&mut self, pa: PhysicalAddress) -> Result<(), FreeError> {
        let index = self.allocated_index(pa)?;
        self.release(index);
        debug!("freed frame {:?}", self.frame_at(index).base());
        Ok(())
    }

    /// Release `count` frames starting with the one containing `first`, as
    /// handed out by [`allocate_contiguous`](Self::allocate_contiguous).
    ///
    /// # Errors
    /// As [`free`](Self::free), for the first frame of the run that is out of
    /// range or not allocated. The bitmap is left untouched.
    pub fn free_contiguous(&mut self, first: PhysicalAddress, count: usize) -> Result<(), FreeError> {
        let first = first.page::<Size4K>().base();
        let start = self.allocated_index(first)?;
        for i in 1..count {
            self.allocated_index(first + (i as u64) * Size4K::SIZE)?;
        }
        for index in start..start + count {
            self.release(index);
        }
        debug!("freed {count} frames from {first:?}");
        Ok(())
    }

    /// `true` if the frame containing `pa` is currently allocated.
    #[must_use]
    pub fn is_allocated(&self, pa: PhysicalAddress) -> bool {
        self.index_of(pa).is_some_and(|i| self.is_used(i))
    }

    fn first_free(&self) -> Option<usize> {
        let (word, bits) = self
            .bitmap
            .iter()
            .enumerate()
            .find(|(_, w)| **w != u64::MAX)?;
        let index = word * 64 + bits.trailing_ones() as usize;
        (index < self.frames).then_some(index)
    }

    fn first_free_run(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let mut run = 0;
        let mut index = 0;
        while index < self.frames {
            if run == 0 && index.is_multiple_of(64) && self.bitmap[index / 64] == u64::MAX {
                index += 64;
                continue;
            }
            if self.is_used(index) {
                run = 0;
            } else {
                run += 1;
                if run == count {
                    return Some(index + 1 - count);
                }
            }
            index += 1;
        }
        None
    }

    const fn is_used(&self, index: usize) -> bool {
        self.bitmap[index / 64] & (1 << (index % 64)) != 0
    }

    /// Mark `index` used and zero the frame.
    fn claim(&mut self, index: usize) {
        self.bitmap[index / 64] |= 1 << (index % 64);
        self.used += 1;
        let frame = self.frame_at(index);
        let bytes = unsafe { self.mapper.phys_to_mut::<[u8; Size4K::SIZE as usize]>(frame.base()) };
        bytes.fill(0);
    }

    fn release(&mut self, index: usize) {
        self.bitmap[index / 64] &= !(1 << (index % 64));
        self.used -= 1;
    }

    fn allocated_index(&self, pa: PhysicalAddress) -> Result<usize, FreeError> {
        let index = self.index_of(pa).ok_or(FreeError::OutOfRange(pa))?;
        if self.is_used(index) {
            Ok(index)
        } else {
            Err(FreeError::DoubleFree(pa))
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn index_of(&self, pa: PhysicalAddress) -> Option<usize> {
        let offset = pa.as_u64().checked_sub(self.base.as_u64())?;
        let index = (offset >> Size4K::SHIFT) as usize;
        (index < self.frames).then_some(index)
    }

    fn frame_at(&self, index: usize) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(self.base + (index as u64) * Size4K::SIZE)
    }
}

impl<M: PhysMapper, const WORDS: usize> FrameAlloc for BitmapFrameAlloc<M, WORDS> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.allocate()
    }

    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) -> Result<(), FreeError> {
        self.free(frame.base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys_mapper::HostMemory;

    const BASE: u64 = 0x0040_0000;

    fn pool(frames: usize) -> BitmapFrameAlloc<HostMemory, 2> {
        BitmapFrameAlloc::new(HostMemory::new(PhysicalAddress::new(BASE), frames), PhysicalAddress::new(BASE), frames)
    }

    #[test]
    fn allocates_lowest_free_frame_first() {
        let mut a = pool(8);
        let f0 = a.allocate().unwrap();
        let f1 = a.allocate().unwrap();
        assert_eq!(f0.base().as_u64(), BASE);
        assert_eq!(f1.base().as_u64(), BASE + 0x1000);
        a.free(f0.base()).unwrap();
        assert_eq!(a.allocate(), Some(f0));
    }

    #[test]
    fn live_frames_never_alias() {
        let mut a = pool(16);
        let mut live = Vec::new();
        for round in 0..40 {
            if round % 3 == 2 {
                let f: PhysicalPage<Size4K> = live.remove(0);
                a.free(f.base()).unwrap();
            } else if let Some(f) = a.allocate() {
                assert!(!live.contains(&f));
                live.push(f);
            }
        }
        assert_eq!(a.used_frames(), live.len());
    }

    #[test]
    fn frames_are_zeroed_on_allocation() {
        let mut a = pool(2);
        let f = a.allocate().unwrap();
        let bytes = unsafe { a.mapper().phys_to_mut::<[u8; 4096]>(f.base()) };
        bytes.fill(0xAA);
        a.free(f.base()).unwrap();

        let again = a.allocate().unwrap();
        assert_eq!(again, f);
        let bytes = unsafe { a.mapper().phys_to_mut::<[u8; 4096]>(again.base()) };
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut a = pool(3);
        assert!(a.allocate().is_some());
        assert!(a.allocate().is_some());
        assert!(a.allocate().is_some());
        assert_eq!(a.allocate(), None);
        assert_eq!(a.free_frames(), 0);
    }

    #[test]
    fn pool_spanning_words() {
        let mut a = pool(100);
        for _ in 0..100 {
            assert!(a.allocate().is_some());
        }
        assert_eq!(a.allocate(), None);
        a.free(PhysicalAddress::new(BASE + 70 * 0x1000)).unwrap();
        assert_eq!(a.allocate().map(|f| f.base().as_u64()), Some(BASE + 70 * 0x1000));
    }

    #[test]
    fn bad_frees_are_detected() {
        let mut a = pool(4);
        let f = a.allocate().unwrap();
        assert_eq!(
            a.free(PhysicalAddress::new(BASE - 0x1000)),
            Err(FreeError::OutOfRange(PhysicalAddress::new(BASE - 0x1000)))
        );
        assert_eq!(
            a.free(PhysicalAddress::new(BASE + 4 * 0x1000)),
            Err(FreeError::OutOfRange(PhysicalAddress::new(BASE + 4 * 0x1000)))
        );
        a.free(f.base()).unwrap();
        assert_eq!(a.free(f.base()), Err(FreeError::DoubleFree(f.base())));
        assert_eq!(a.used_frames(), 0);
    }

    #[test]
    fn contiguous_runs_skip_fragmented_holes() {
        let mut a = pool(100);
        let frames: Vec<_> = (0..70).map(|_| a.allocate().unwrap()).collect();
        // holes of one frame at 1 and of two frames at 65..67
        a.free(frames[1].base()).unwrap();
        a.free(frames[65].base()).unwrap();
        a.free(frames[66].base()).unwrap();

        let run = a.allocate_contiguous(4).unwrap();
        assert_eq!(run.base().as_u64(), BASE + 70 * 0x1000);
        assert_eq!(a.used_frames(), 67 + 4);
        let two = a.allocate_contiguous(2).unwrap();
        assert_eq!(two.base().as_u64(), BASE + 65 * 0x1000);

        a.free_contiguous(run.base(), 4).unwrap();
        assert_eq!(a.used_frames(), 69);
        assert!(!a.is_allocated(run.base() + 3 * 0x1000));
    }

    #[test]
    fn contiguous_runs_are_zeroed_and_bounded() {
        let mut a = pool(8);
        let run = a.allocate_contiguous(3).unwrap();
        for i in 0..3 {
            let bytes = unsafe { a.mapper().phys_to_mut::<[u8; 4096]>(run.base() + i * 0x1000) };
            assert!(bytes.iter().all(|b| *b == 0));
            bytes.fill(0x55);
        }
        a.free_contiguous(run.base(), 3).unwrap();
        let again = a.allocate_contiguous(3).unwrap();
        let bytes = unsafe { a.mapper().phys_to_mut::<[u8; 4096]>(again.base() + 0x2000) };
        assert!(bytes.iter().all(|b| *b == 0));

        assert_eq!(a.allocate_contiguous(6), None);
        assert_eq!(a.allocate_contiguous(0), None);
        assert_eq!(a.used_frames(), 3);
    }

    #[test]
    fn partial_contiguous_free_leaves_the_bitmap_alone() {
        let mut a = pool(8);
        let run = a.allocate_contiguous(2).unwrap();
        assert_eq!(
            a.free_contiguous(run.base(), 3),
            Err(FreeError::DoubleFree(run.base() + 2 * 0x1000))
        );
        assert_eq!(a.used_frames(), 2);
        assert!(a.is_allocated(run.base()));
    }

    #[test]
    fn free_accepts_any_address_inside_the_frame() {
        let mut a = pool(4);
        let f = a.allocate().unwrap();
        a.free(f.base() + 0x123).unwrap();
        assert!(!a.is_allocated(f.base()));
    }

    #[test]
    fn kernel_pool_covers_the_layout() {
        let a = KernelFrameAlloc::kernel_pool();
        assert_eq!(a.capacity(), PAGING_PAGES);
        assert_eq!(a.free_frames(), PAGING_PAGES);
    }
}
