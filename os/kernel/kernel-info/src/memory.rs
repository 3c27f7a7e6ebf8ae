//! # Memory Layout

use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K, VirtualAddress};

/// Translation granule in bytes.
pub const PAGE_SIZE: u64 = Size4K::SIZE;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = Size4K::SHIFT;

/// Number of VA bits resolved per table level.
pub const TABLE_SHIFT: u32 = 9;

/// Entries per translation table.
pub const PTRS_PER_TABLE: usize = 1 << TABLE_SHIFT;

/// VA shift of the level 0 index (bits `[47:39]`).
pub const L0_SHIFT: u32 = PAGE_SHIFT + 3 * TABLE_SHIFT;

/// VA shift of the level 1 index (bits `[38:30]`).
pub const L1_SHIFT: u32 = PAGE_SHIFT + 2 * TABLE_SHIFT;

/// VA shift of the level 2 index (bits `[29:21]`).
pub const L2_SHIFT: u32 = PAGE_SHIFT + TABLE_SHIFT;

/// VA shift of the level 3 index (bits `[20:12]`).
pub const L3_SHIFT: u32 = PAGE_SHIFT;

/// Size of a level 2 block (2 MiB), used for the boot section map.
pub const SECTION_SIZE: u64 = 1 << L2_SHIFT;

/// Start of the kernel half. The kernel reaches any frame at `VA_START + pa`.
pub const VA_START: u64 = 0xffff_0000_0000_0000;

/// First address past the user half (48-bit `TTBR0_EL1` range).
pub const USER_SPACE_END: u64 = 0x0001_0000_0000_0000;

/// Peripheral MMIO base (BCM2837).
pub const PBASE: u64 = 0x3F00_0000;

/// First frame of the page pool; everything below belongs to the kernel image.
pub const LOW_MEMORY: u64 = 2 * SECTION_SIZE;

/// End of the page pool (exclusive).
pub const HIGH_MEMORY: u64 = PBASE;

/// Number of frames managed by the frame allocator.
#[allow(clippy::cast_possible_truncation)]
pub const PAGING_PAGES: usize = ((HIGH_MEMORY - LOW_MEMORY) / PAGE_SIZE) as usize;

/// Number of `u64` words backing the frame bitmap.
pub const PAGING_BITMAP_WORDS: usize = PAGING_PAGES.div_ceil(64);

/// Translate a physical address into the kernel linear map.
#[inline]
#[must_use]
pub const fn kernel_alias(pa: PhysicalAddress) -> VirtualAddress {
    VirtualAddress::new(VA_START | pa.as_u64())
}

const _: () = {
    assert!(LOW_MEMORY.is_multiple_of(PAGE_SIZE));
    assert!(HIGH_MEMORY.is_multiple_of(PAGE_SIZE));
    assert!(LOW_MEMORY < HIGH_MEMORY);
    assert!(PAGING_PAGES == 257_024);
    assert!(L0_SHIFT == 39 && L1_SHIFT == 30 && L2_SHIFT == 21);
    assert!(USER_SPACE_END <= VA_START);
};
