//! # Kernel Configuration
//!
//! Compile-time layout and limit constants shared by every kernel crate. This
//! is the single source of truth for where the frame pool lives, how the
//! kernel reaches physical memory, and how large the fixed-capacity process
//! tables are. There is no runtime configuration: the kernel has no
//! filesystem and no command line, and all bookkeeping is sized statically.
//!
//! ## Virtual Address Space (48-bit VA, 4 KiB granule)
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │  User space (TTBR0_EL1)         │
//!                       │  per-task page tables           │
//! USER_STACK_TOP        ├─────────────────────────────────┤ 0x0000_0000_0080_0000
//!                       │  ...                            │
//! USER_SPACE_END        ├─────────────────────────────────┤ 0x0001_0000_0000_0000
//!                       │  non-canonical                  │
//! VA_START              ├─────────────────────────────────┤ 0xffff_0000_0000_0000
//!                       │  Kernel linear map (TTBR1_EL1)  │
//!                       │  VA_START + pa for all RAM      │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Physical Frame Pool
//!
//! ```text
//! 0x0000_0000 ┌──────────────────────────┐
//!             │ kernel image, boot stack │
//! LOW_MEMORY  ├──────────────────────────┤ 0x0040_0000 (4 MiB)
//!             │ page frame pool          │ PAGING_PAGES frames
//! HIGH_MEMORY ├──────────────────────────┤ 0x3F00_0000 (peripheral base)
//!             │ MMIO                     │
//!             └──────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`memory`]: paging geometry, the kernel linear map, the frame pool.
//! - [`process`]: task, PID and per-process bookkeeping limits.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod process;
