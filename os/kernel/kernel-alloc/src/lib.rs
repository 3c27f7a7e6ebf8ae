//! # Kernel Memory Allocation
//!
//! Physical frame allocation and the small set of virtual memory operations
//! the process core needs on top of [`kernel_vmem`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Vmm (vmm)                           │
//! │    • kernel-alias and user-backed allocations       │
//! │    • address space deep copy / teardown             │
//! │    • reads from user memory                         │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Mapper (phys_mapper)          │
//! │    • kernel linear map at VA_START + pa             │
//! │    • simulated RAM for host tests (`hosted`)        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Frame Allocator (frame_alloc)             │
//! │    • one bit per 4 KiB frame, first fit             │
//! │    • zero-fill on allocation                        │
//! │    • detected double frees                          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here allocates from a heap. The frame pool and its bitmap are
//! sized by [`kernel_info::memory`] at compile time.
//!
//! ## Features
//!
//! - `hosted`: enables [`phys_mapper::HostMemory`], a [`PhysMapper`](kernel_vmem::PhysMapper)
//!   backed by ordinary process memory, so that the allocator, the page-table
//!   walker and everything above them can be exercised by `cargo test`.

#![cfg_attr(not(any(test, doctest, feature = "hosted")), no_std)]
#![allow(unsafe_code)]

pub mod frame_alloc;
pub mod phys_mapper;
pub mod vmm;

pub use crate::frame_alloc::{BitmapFrameAlloc, KernelFrameAlloc};
pub use crate::vmm::{Vmm, VmmError};
