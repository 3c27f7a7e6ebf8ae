//! # Physical and Virtual Address Types (AArch64)
//!
//! Strongly typed wrappers for raw addresses and 4 KiB page bases, used by the
//! page-table walker, the frame allocator and the scheduler so that a physical
//! frame address can never be handed to something expecting a virtual one.
//!
//! | Wrapper | Meaning |
//! |---------|---------|
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Bus address of RAM (or MMIO). |
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Address translated by `TTBR0_EL1` / `TTBR1_EL1`. |
//!
//! Both wrap a [`MemoryAddress`], the kind-less 64-bit value.
//!
//! ## Page Sizes
//!
//! The kernel runs with the 4 KiB translation granule, so [`Size4K`] is the
//! only [`PageSize`] marker. The trait is sealed.
//!
//! ## Halves of the Address Space
//!
//! With a 48-bit VA configuration, addresses whose top 16 bits are all zero
//! are translated through `TTBR0_EL1` (user space), addresses whose top 16 bits
//! are all ones through `TTBR1_EL1` (kernel space).
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0000_0000_0040_1234);
//! assert!(va.is_lower_half());
//! let page = va.page::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0x0040_1000);
//! assert_eq!(va.offset::<Size4K>(), 0x234);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod memory_address;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use crate::memory_address::MemoryAddress;
pub use crate::page_size::{PageSize, Size4K};
pub use crate::physical_address::PhysicalAddress;
pub use crate::physical_page::PhysicalPage;
pub use crate::virtual_address::VirtualAddress;
pub use crate::virtual_page::VirtualPage;
