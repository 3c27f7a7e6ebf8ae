//! # Task Control Block
//!
//! The record the scheduler keeps per task. The register layout is shared
//! with the context switch and exception entry assembly:
//!
//! ```text
//! Task (repr C)
//! ┌──────────────────────┐ 0    CpuContext: x19..x28, fp, sp, pc
//! ├──────────────────────┤ 112  FpsimdContext: v0..v31, fpsr, fpcr
//! ├──────────────────────┤
//! │ state, counter,      │
//! │ priority, preempt,   │
//! │ pid, flags, ...      │
//! └──────────────────────┘
//!
//! kernel stack (THREAD_PAGES contiguous frames, 16 KiB)
//! ┌──────────────────────┐ top
//! │ TrapFrame (272 B)    │ ◄─ sp of a new task
//! │ stack grows down ▼   │
//! └──────────────────────┘ base
//! ```

use core::mem::offset_of;

use bitflags::bitflags;
use kernel_info::process::THREAD_SIZE;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::AddressSpace;

use crate::pid::Pid;
use crate::task_table::TaskId;

/// Offset of [`Task::context`], used by `cpu_switch_to`.
pub const THREAD_CPU_CONTEXT: usize = 0;

/// Offset of [`Task::fpsimd`], used by exception entry.
pub const THREAD_FPSIMD_CONTEXT: usize = 112;

/// `SPSR_EL1` value returning to EL0 with `SP_EL0`.
pub const PSR_MODE_EL0T: u64 = 0x0000_0000;

/// Callee-saved registers preserved across [`Cpu::switch_context`](crate::Cpu::switch_context).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuContext {
    pub x19: u64,
    pub x20: u64,
    pub x21: u64,
    pub x22: u64,
    pub x23: u64,
    pub x24: u64,
    pub x25: u64,
    pub x26: u64,
    pub x27: u64,
    pub x28: u64,
    pub fp: u64,
    pub sp: u64,
    pub pc: u64,
}

/// FP/SIMD register file.
#[repr(C, align(16))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FpsimdContext {
    pub vregs: [u128; 32],
    pub fpsr: u32,
    pub fpcr: u32,
}

impl FpsimdContext {
    pub const fn zeroed() -> Self {
        Self {
            vregs: [0; 32],
            fpsr: 0,
            fpcr: 0,
        }
    }
}

/// Registers saved by exception entry at the top of the kernel stack.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TrapFrame {
    pub regs: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub pstate: u64,
}

impl TrapFrame {
    pub const fn zeroed() -> Self {
        Self {
            regs: [0; 31],
            sp: 0,
            pc: 0,
            pstate: 0,
        }
    }
}

/// Physical address of the trap frame at the top of the kernel stack that
/// starts at `stack`.
#[inline]
#[must_use]
pub const fn trap_frame_address(stack: PhysicalPage<Size4K>) -> PhysicalAddress {
    PhysicalAddress::new(stack.base().as_u64() + THREAD_SIZE - size_of::<TrapFrame>() as u64)
}

#[repr(i64)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    Running = 0,
    Zombie = 1,
}

bitflags! {
    #[repr(transparent)]
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct TaskFlags: u32 {
        /// Started from a kernel function rather than forked from user space.
        const KTHREAD = 0x0000_0002;
    }
}

/// Entry point of a kernel thread, called with its argument.
pub type ThreadEntry = extern "C" fn(u64);

/// A schedulable unit.
#[repr(C)]
pub struct Task {
    pub context: CpuContext,
    pub fpsimd: FpsimdContext,
    pub state: TaskState,
    /// Remaining time slices.
    pub counter: i64,
    /// Slices added per decay round.
    pub priority: i64,
    /// Preemption is disabled while nonzero.
    pub preempt_count: i64,
    pub pid: Pid,
    pub flags: TaskFlags,
    /// First of the `THREAD_PAGES` frames of the kernel stack. `None` for the
    /// boot task, which runs on the boot stack.
    pub kernel_stack: Option<PhysicalPage<Size4K>>,
    pub mm: AddressSpace,
    pub(crate) next: Option<TaskId>,
}

const _: () = {
    assert!(offset_of!(Task, context) == THREAD_CPU_CONTEXT);
    assert!(offset_of!(Task, fpsimd) == THREAD_FPSIMD_CONTEXT);
    assert!(size_of::<CpuContext>() == 13 * 8);
    assert!(size_of::<TrapFrame>() == 272);
    assert!(size_of::<TrapFrame>() as u64 <= THREAD_SIZE);
};

impl Task {
    /// The boot task: PID 0, priority 1, running on the boot stack.
    #[must_use]
    pub const fn init() -> Self {
        Self {
            counter: 0,
            preempt_count: 0,
            flags: TaskFlags::KTHREAD,
            ..Self::new(Pid::INIT, 1)
        }
    }

    /// A fresh task with a full slice and preemption held until its first
    /// run reaches `schedule_tail`.
    #[must_use]
    pub const fn new(pid: Pid, priority: i64) -> Self {
        Self {
            context: CpuContext {
                x19: 0,
                x20: 0,
                x21: 0,
                x22: 0,
                x23: 0,
                x24: 0,
                x25: 0,
                x26: 0,
                x27: 0,
                x28: 0,
                fp: 0,
                sp: 0,
                pc: 0,
            },
            fpsimd: FpsimdContext::zeroed(),
            state: TaskState::Running,
            counter: priority,
            priority,
            preempt_count: 1,
            pid,
            flags: TaskFlags::empty(),
            kernel_stack: None,
            mm: AddressSpace::new(),
            next: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, TaskState::Running)
    }

    #[inline]
    #[must_use]
    pub const fn is_kernel_thread(&self) -> bool {
        self.flags.contains(TaskFlags::KTHREAD)
    }

    /// Physical address of this task's trap frame.
    #[inline]
    #[must_use]
    pub const fn trap_frame(&self) -> Option<PhysicalAddress> {
        match self.kernel_stack {
            Some(stack) => Some(trap_frame_address(stack)),
            None => None,
        }
    }
}
