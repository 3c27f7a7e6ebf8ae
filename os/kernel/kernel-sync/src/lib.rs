//! # Single-Core Synchronization Primitives
//!
//! The process core runs on exactly one CPU. Its only concurrency is the
//! timer interrupt preempting kernel code, so the primitives here are about
//! interrupt masking and one-time initialization rather than locking:
//!
//! - [`SyncOnceCell`]: initialize a global exactly once.
//! - [`UniprocessorCell`]: a global that hands out `&mut T` under the
//!   single-core discipline (preemption or interrupts disabled).
//! - [`irq`] (AArch64 bare metal only): `DAIF.I` masking and the
//!   [`IrqGuard`](irq::IrqGuard) RAII guard.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod irq;
mod sync_once_cell;
mod uniprocessor_cell;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use irq::IrqGuard;
pub use sync_once_cell::SyncOnceCell;
pub use uniprocessor_cell::UniprocessorCell;
