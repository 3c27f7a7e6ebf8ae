use kernel_memory_addresses::{PhysicalPage, Size4K};

use super::Cpu;
use crate::task::CpuContext;

/// Trampoline address handed to new tasks.
const TRAMPOLINE: u64 = 0xFFFF_0000_0008_0000;

/// Resume address recorded for a switched-out task.
const RESUME: u64 = 0xFFFF_0000_0008_1000;

/// Recording stand-in for the CPU, used when the scheduler runs as an
/// ordinary host process.
///
/// Registers are not really transferred: the caller keeps running after
/// [`switch_context`](Cpu::switch_context). What a real switch would leave
/// behind is reproduced in the contexts, and first entries of new tasks are
/// flagged so a test can run the trampoline's `schedule_tail` itself.
#[derive(Debug, Default)]
pub struct HostCpu {
    root: Option<PhysicalPage<Size4K>>,
    irq_enabled: bool,
    switches: usize,
    irq_enables: usize,
    fresh_entry: bool,
}

impl HostCpu {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: None,
            irq_enabled: false,
            switches: 0,
            irq_enables: 0,
            fresh_entry: false,
        }
    }

    /// The translation root last installed.
    #[must_use]
    pub const fn root(&self) -> Option<PhysicalPage<Size4K>> {
        self.root
    }

    #[must_use]
    pub const fn irq_enabled(&self) -> bool {
        self.irq_enabled
    }

    /// Number of context switches performed.
    #[must_use]
    pub const fn switches(&self) -> usize {
        self.switches
    }

    /// Number of times IRQs were unmasked.
    #[must_use]
    pub const fn irq_enables(&self) -> usize {
        self.irq_enables
    }

    /// `true` once after switching to a task that has never run.
    pub const fn take_fresh_entry(&mut self) -> bool {
        core::mem::replace(&mut self.fresh_entry, false)
    }
}

impl Cpu for HostCpu {
    fn set_translation_root(&mut self, root: Option<PhysicalPage<Size4K>>) {
        self.root = root;
    }

    unsafe fn switch_context(&mut self, prev: *mut CpuContext, next: *const CpuContext) {
        unsafe {
            (*prev).pc = RESUME;
            self.fresh_entry = (*next).pc == TRAMPOLINE;
        }
        self.switches += 1;
    }

    fn enable_irq(&mut self) {
        self.irq_enabled = true;
        self.irq_enables += 1;
    }

    fn disable_irq(&mut self) {
        self.irq_enabled = false;
    }

    fn return_trampoline(&self) -> u64 {
        TRAMPOLINE
    }
}
