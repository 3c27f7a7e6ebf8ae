//! The architecture operations the scheduler needs, behind one trait so the
//! scheduling logic runs unchanged on the board and in host tests.

use kernel_memory_addresses::{PhysicalPage, Size4K};

use crate::task::CpuContext;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod aarch64;
#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
mod host;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use aarch64::Aarch64Cpu;
#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
pub use host::HostCpu;

pub trait Cpu {
    /// Make `root` the user translation table (`TTBR0_EL1`). `None` leaves
    /// no user space mapped.
    fn set_translation_root(&mut self, root: Option<PhysicalPage<Size4K>>);

    /// Save the callee-saved registers into `prev` and resume from `next`.
    /// Returns once some later switch resumes `prev`.
    ///
    /// # Safety
    /// Both pointers must refer to contexts in the task arena. `next` must
    /// hold a context saved by this function or prepared by process
    /// creation.
    unsafe fn switch_context(&mut self, prev: *mut CpuContext, next: *const CpuContext);

    fn enable_irq(&mut self);

    fn disable_irq(&mut self);

    /// Address new tasks start executing at.
    fn return_trampoline(&self) -> u64;
}
