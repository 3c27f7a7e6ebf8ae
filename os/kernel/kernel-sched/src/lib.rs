//! # Tasks and Scheduling
//!
//! The process half of the kernel core: PID allocation, task control blocks,
//! process creation, the priority-decay scheduler and the demand-fault
//! handler. All of it hangs off one [`Kernel`] value:
//!
//! ```text
//!              ┌───────────── Kernel<C, M> ─────────────┐
//!  timer IRQ ─►│ tick ─┐                                 │
//!  syscalls  ─►│ create, exit, schedule, set_priority    │
//!  data abort ►│ handle_fault                            │
//!              │       ▼                                 │
//!              │ TaskTable ── PidBitmap ── Frames (M)    │
//!              │       │                                 │
//!              │       ▼                                 │
//!              │  C: Cpu (TTBR0, context switch, IRQs)   │
//!              └─────────────────────────────────────────┘
//! ```
//!
//! - [`Cpu`] isolates the architecture: `Aarch64Cpu` on the board,
//!   `HostCpu` everywhere else, so the scheduling logic is tested as an
//!   ordinary program.
//! - [`KernelCell`] holds the installed kernel; on bare metal the
//!   `extern "C"` entry points the exception code calls live next to it.
//!
//! ## Preemption
//!
//! There is one core and no lock. A task's `preempt_count` keeps the timer
//! from switching away while it is nonzero; process creation holds it for
//! the whole operation, and new tasks start with a hold that
//! [`Kernel::schedule_tail`] drops on their first run.
//!
//! ## Example
//!
//! ```rust
//! use kernel_alloc::BitmapFrameAlloc;
//! use kernel_alloc::phys_mapper::HostMemory;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_sched::{HostCpu, Kernel, TaskKind};
//!
//! extern "C" fn worker(_arg: u64) {}
//!
//! let base = PhysicalAddress::new(0x0040_0000);
//! let frames = BitmapFrameAlloc::new(HostMemory::new(base, 16), base, 16);
//! let mut kernel = Kernel::new(HostCpu::new(), frames);
//!
//! let pid = kernel
//!     .create(TaskKind::KernelThread { entry: worker, arg: 7 }, 2)
//!     .unwrap();
//! kernel.schedule();
//! assert_eq!(kernel.current_pid(), pid);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod cpu;
pub mod error;
pub mod fault;
pub mod fork;
pub mod kernel;
pub mod pid;
pub mod scheduler;
pub mod service;
pub mod task;
pub mod task_table;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use crate::cpu::Aarch64Cpu;
pub use crate::cpu::Cpu;
#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
pub use crate::cpu::HostCpu;
pub use crate::error::{ErrorKind, FaultError, KernelError, PidError};
pub use crate::fault::Esr;
pub use crate::fork::TaskKind;
pub use crate::kernel::{Frames, Kernel, USER_COPY_CHUNK};
pub use crate::pid::{Pid, PidBitmap};
pub use crate::service::KernelCell;
pub use crate::task::{CpuContext, Task, TaskFlags, TaskState, ThreadEntry, TrapFrame};
pub use crate::task_table::{TaskId, TaskTable};
