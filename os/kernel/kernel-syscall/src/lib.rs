//! # System Calls
//!
//! The fixed table user tasks reach with `svc #0`: the syscall number in
//! `x8`, the argument in `x0`, the result written back to `x0`. Every entry
//! only forwards to the [`Kernel`].
//!
//! | Nr | Name           | Argument              | Result          |
//! |----|----------------|-----------------------|-----------------|
//! | 0  | `write`        | user pointer to a NUL-terminated string | 0 |
//! | 1  | `fork`         | -                     | child PID (0 in the child) |
//! | 2  | `exit`         | -                     | does not return |
//! | 3  | `getpid`       | -                     | PID             |
//! | 4  | `set_priority` | new priority          | 0               |
//!
//! Failures return [`SYSCALL_ERROR`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod user;

use kernel_info::process::MAX_WRITE_LEN;
use kernel_logger::ConsoleSink;
use kernel_memory_addresses::VirtualAddress;
use kernel_sched::{Cpu, Kernel, TaskKind, TrapFrame};
use kernel_vmem::PhysMapper;
use log::warn;

/// Number of table entries.
pub const NR_SYSCALLS: usize = 5;

/// Returned in `x0` for failed and unknown calls (`-1`).
pub const SYSCALL_ERROR: u64 = u64::MAX;

#[repr(u64)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sysno {
    Write = 0,
    Fork = 1,
    Exit = 2,
    GetPid = 3,
    SetPriority = 4,
}

impl TryFrom<u64> for Sysno {
    type Error = u64;

    fn try_from(nr: u64) -> Result<Self, Self::Error> {
        Ok(match nr {
            0 => Self::Write,
            1 => Self::Fork,
            2 => Self::Exit,
            3 => Self::GetPid,
            4 => Self::SetPriority,
            _ => return Err(nr),
        })
    }
}

/// Where `write` output goes.
pub trait Console {
    fn write_bytes(&mut self, bytes: &[u8]);
}

impl Console for ConsoleSink {
    fn write_bytes(&mut self, bytes: &[u8]) {
        Self::write_bytes(self, bytes);
    }
}

/// What a handler works on.
pub struct SyscallContext<'a, C: Cpu, M: PhysMapper + Clone, W: Console> {
    pub kernel: &'a mut Kernel<C, M>,
    pub console: &'a mut W,
}

pub type Handler<C, M, W> = fn(&mut SyscallContext<'_, C, M, W>, u64) -> u64;

/// The dispatch table, indexed by [`Sysno`].
pub struct SyscallTable<C: Cpu, M: PhysMapper + Clone, W: Console> {
    handlers: [Handler<C, M, W>; NR_SYSCALLS],
}

impl<C: Cpu, M: PhysMapper + Clone, W: Console> SyscallTable<C, M, W> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handlers: [sys_write, sys_fork, sys_exit, sys_getpid, sys_set_priority],
        }
    }

    /// Run call `nr` with `arg`.
    pub fn invoke(&self, cx: &mut SyscallContext<'_, C, M, W>, nr: u64, arg: u64) -> u64 {
        match Sysno::try_from(nr) {
            Ok(sysno) => (self.handlers[sysno as usize])(cx, arg),
            Err(nr) => {
                warn!("unknown syscall {nr}");
                SYSCALL_ERROR
            }
        }
    }

    /// Run the call described by a trap frame and store the result in `x0`.
    pub fn dispatch(&self, cx: &mut SyscallContext<'_, C, M, W>, regs: &mut TrapFrame) {
        regs.regs[0] = self.invoke(cx, regs.regs[8], regs.regs[0]);
    }
}

impl<C: Cpu, M: PhysMapper + Clone, W: Console> Default for SyscallTable<C, M, W> {
    fn default() -> Self {
        Self::new()
    }
}

fn sys_write<C: Cpu, M: PhysMapper + Clone, W: Console>(
    cx: &mut SyscallContext<'_, C, M, W>,
    buf: u64,
) -> u64 {
    let console = &mut *cx.console;
    match cx
        .kernel
        .copy_user_str(VirtualAddress::new(buf), MAX_WRITE_LEN, |bytes| console.write_bytes(bytes))
    {
        Ok(_) => 0,
        Err(e) => {
            warn!("write from task {}: {e}", cx.kernel.current_pid());
            SYSCALL_ERROR
        }
    }
}

fn sys_fork<C: Cpu, M: PhysMapper + Clone, W: Console>(cx: &mut SyscallContext<'_, C, M, W>, _: u64) -> u64 {
    let priority = cx.kernel.current().priority;
    cx.kernel
        .create(TaskKind::UserFork, priority)
        .map_or(SYSCALL_ERROR, |pid| u64::from(pid.as_u32()))
}

fn sys_exit<C: Cpu, M: PhysMapper + Clone, W: Console>(cx: &mut SyscallContext<'_, C, M, W>, _: u64) -> u64 {
    cx.kernel.exit();
    0
}

fn sys_getpid<C: Cpu, M: PhysMapper + Clone, W: Console>(cx: &mut SyscallContext<'_, C, M, W>, _: u64) -> u64 {
    u64::from(cx.kernel.current_pid().as_u32())
}

#[allow(clippy::cast_possible_wrap)]
fn sys_set_priority<C: Cpu, M: PhysMapper + Clone, W: Console>(
    cx: &mut SyscallContext<'_, C, M, W>,
    priority: u64,
) -> u64 {
    cx.kernel.set_priority(priority as i64);
    0
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use board::kernel_syscall;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod board {
    use kernel_alloc::phys_mapper::KernelAliasMapper;
    use kernel_logger::ConsoleSink;
    use kernel_sched::service::kernel;
    use kernel_sched::{Aarch64Cpu, TrapFrame};

    use super::{SYSCALL_ERROR, SyscallContext, SyscallTable};

    static TABLE: SyscallTable<Aarch64Cpu, KernelAliasMapper, ConsoleSink> = SyscallTable::new();

    /// Called by the `svc` exception handler with the saved trap frame.
    #[unsafe(no_mangle)]
    pub extern "C" fn kernel_syscall(regs: &mut TrapFrame) {
        let Some(kernel) = (unsafe { kernel() }) else {
            regs.regs[0] = SYSCALL_ERROR;
            return;
        };
        let mut console = ConsoleSink;
        let mut cx = SyscallContext {
            kernel,
            console: &mut console,
        };
        TABLE.dispatch(&mut cx, regs);
    }
}
