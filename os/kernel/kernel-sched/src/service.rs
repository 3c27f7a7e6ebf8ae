//! The one place the kernel context lives once the system is up.
//!
//! [`KernelCell`] is installed once during boot. Afterwards it is only
//! reached from the current task (with preemption disabled where a switch
//! must not intervene) and from the timer and fault handlers. On bare-metal
//! AArch64 the entry points the assembly calls into are defined here too.

use kernel_sync::{SyncOnceCell, UniprocessorCell};
use kernel_vmem::PhysMapper;

use crate::cpu::Cpu;
use crate::kernel::Kernel;

/// Once-initialized home of a [`Kernel`].
pub struct KernelCell<C: Cpu, M: PhysMapper + Clone> {
    cell: SyncOnceCell<UniprocessorCell<Kernel<C, M>>>,
}

impl<C: Cpu, M: PhysMapper + Clone> KernelCell<C, M> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: SyncOnceCell::new(),
        }
    }

    /// Install `kernel`.
    ///
    /// # Errors
    /// Hands `kernel` back if one is already installed.
    pub fn install(&self, kernel: Kernel<C, M>) -> Result<(), Kernel<C, M>> {
        self.cell
            .set(UniprocessorCell::new(kernel))
            .map(|_| ())
            .map_err(UniprocessorCell::into_inner)
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.cell.is_initialized()
    }

    /// The installed kernel.
    ///
    /// # Safety
    /// See [`UniprocessorCell::get_mut`]: single core, and no other live
    /// reference obtained from this cell may be used while this one is.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self) -> Option<&mut Kernel<C, M>> {
        self.cell.get().map(|k| unsafe { k.get_mut() })
    }
}

impl<C: Cpu, M: PhysMapper + Clone> Default for KernelCell<C, M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use board::*;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod board {
    use kernel_alloc::KernelFrameAlloc;
    use kernel_alloc::phys_mapper::KernelAliasMapper;
    use kernel_sync::IrqGuard;
    use log::error;

    use super::KernelCell;
    use crate::cpu::Aarch64Cpu;
    use crate::kernel::Kernel;

    pub type BoardKernel = Kernel<Aarch64Cpu, KernelAliasMapper>;

    pub static KERNEL: KernelCell<Aarch64Cpu, KernelAliasMapper> = KernelCell::new();

    /// Install the kernel context over the whole frame pool. The caller
    /// becomes the boot task (PID 0). `false` if already installed.
    #[must_use]
    pub fn init() -> bool {
        let _irq = IrqGuard::new();
        KERNEL
            .install(Kernel::new(Aarch64Cpu, KernelFrameAlloc::kernel_pool()))
            .is_ok()
    }

    /// The installed kernel context.
    ///
    /// # Safety
    /// See [`KernelCell::get`].
    pub unsafe fn kernel() -> Option<&'static mut BoardKernel> {
        unsafe { KERNEL.get() }
    }

    /// Called by `ret_from_fork` on a new task's first run.
    #[unsafe(no_mangle)]
    pub extern "C" fn kernel_schedule_tail() {
        if let Some(k) = unsafe { kernel() } {
            k.schedule_tail();
        }
    }

    /// Called by the timer interrupt handler after rearming the timer.
    #[unsafe(no_mangle)]
    pub extern "C" fn kernel_timer_tick() {
        if let Some(k) = unsafe { kernel() } {
            k.tick();
        }
    }

    /// Called by the synchronous exception handler for data aborts.
    /// Returns 0 if the fault was resolved, -1 otherwise.
    #[unsafe(no_mangle)]
    pub extern "C" fn kernel_do_mem_abort(addr: u64, esr: u64) -> i32 {
        let Some(k) = (unsafe { kernel() }) else {
            return -1;
        };
        match k.handle_fault(addr, esr) {
            Ok(()) => 0,
            Err(e) => {
                error!("task {}: {e}", k.current_pid());
                -1
            }
        }
    }

    /// Terminate the current task.
    #[unsafe(no_mangle)]
    pub extern "C" fn kernel_exit_process() {
        if let Some(k) = unsafe { kernel() } {
            k.exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use kernel_alloc::BitmapFrameAlloc;
    use kernel_alloc::phys_mapper::HostMemory;
    use kernel_memory_addresses::PhysicalAddress;

    use super::*;
    use crate::cpu::HostCpu;
    use crate::pid::Pid;

    fn kernel() -> Kernel<HostCpu, HostMemory> {
        let base = PhysicalAddress::new(0x0040_0000);
        Kernel::new(
            HostCpu::new(),
            BitmapFrameAlloc::new(HostMemory::new(base, 8), base, 8),
        )
    }

    #[test]
    fn installs_exactly_once() {
        let cell = KernelCell::new();
        assert!(!cell.is_installed());
        assert!(unsafe { cell.get() }.is_none());
        assert!(cell.install(kernel()).is_ok());
        assert!(cell.install(kernel()).is_err());

        let k = unsafe { cell.get() }.unwrap();
        assert_eq!(k.current_pid(), Pid::INIT);
    }
}
