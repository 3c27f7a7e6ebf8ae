//! Context switch and task entry for AArch64 at EL1.
//!
//! `ret_from_fork` is the first code a new task runs. Kernel threads have
//! their entry in `x19` and its argument in `x20`; forked user tasks have
//! `x19 == 0` and go straight back to EL0 through the trap frame. A kernel
//! thread that returns also leaves through `ret_to_user`, which is how
//! `move_to_user_mode` takes effect.

use core::arch::{asm, naked_asm};

use kernel_memory_addresses::{PhysicalPage, Size4K};
use kernel_sync::irq::{local_irq_disable, local_irq_enable};

use super::Cpu;
use crate::task::CpuContext;

unsafe extern "C" {
    /// Exception return path restoring the trap frame, provided by the
    /// exception vector code.
    fn ret_to_user() -> !;
}

/// Stores `x19..x28`, `fp`, `sp` and `lr` into `*x0`, loads them from
/// `*x1` and returns into the loaded `lr`.
#[unsafe(naked)]
unsafe extern "C" fn cpu_switch_to(prev: *mut CpuContext, next: *const CpuContext) {
    naked_asm!(
        "mov x10, x0",
        "mov x9, sp",
        "stp x19, x20, [x10], #16",
        "stp x21, x22, [x10], #16",
        "stp x23, x24, [x10], #16",
        "stp x25, x26, [x10], #16",
        "stp x27, x28, [x10], #16",
        "stp x29, x9, [x10], #16",
        "str x30, [x10]",
        "mov x10, x1",
        "ldp x19, x20, [x10], #16",
        "ldp x21, x22, [x10], #16",
        "ldp x23, x24, [x10], #16",
        "ldp x25, x26, [x10], #16",
        "ldp x27, x28, [x10], #16",
        "ldp x29, x9, [x10], #16",
        "ldr x30, [x10]",
        "mov sp, x9",
        "ret",
    );
}

#[unsafe(naked)]
unsafe extern "C" fn ret_from_fork() -> ! {
    naked_asm!(
        "bl {tail}",
        "cbz x19, 1f",
        "mov x0, x20",
        "blr x19",
        "1:",
        "b {user}",
        tail = sym crate::service::kernel_schedule_tail,
        user = sym ret_to_user,
    );
}

/// The AArch64 EL1 implementation of [`Cpu`].
#[derive(Copy, Clone, Debug, Default)]
pub struct Aarch64Cpu;

impl Cpu for Aarch64Cpu {
    fn set_translation_root(&mut self, root: Option<PhysicalPage<Size4K>>) {
        let pgd = root.map_or(0, |r| r.base().as_u64());
        unsafe {
            asm!(
                "msr ttbr0_el1, {pgd}",
                "tlbi vmalle1is",
                "dsb ish",
                "isb",
                pgd = in(reg) pgd,
                options(nostack, preserves_flags)
            );
        }
    }

    unsafe fn switch_context(&mut self, prev: *mut CpuContext, next: *const CpuContext) {
        unsafe { cpu_switch_to(prev, next) }
    }

    fn enable_irq(&mut self) {
        local_irq_enable();
    }

    fn disable_irq(&mut self) {
        local_irq_disable();
    }

    fn return_trampoline(&self) -> u64 {
        ret_from_fork as usize as u64
    }
}
