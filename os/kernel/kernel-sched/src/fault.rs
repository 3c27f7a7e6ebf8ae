//! # Demand Faults
//!
//! Data aborts from translation and permission faults are resolved by
//! backing the faulting page with a fresh frame. Anything else, and every
//! fault that cannot be resolved, is handed back to the exception
//! dispatcher as a [`FaultError`].

use bitfield_struct::bitfield;
use kernel_alloc::Vmm;
use kernel_memory_addresses::{Size4K, VirtualAddress};
use kernel_vmem::PhysMapper;
use kernel_vmem::fault_status::{DFSC_PERMISSION, DFSC_TRANSLATION, DFSC_TYPE_MASK};
use log::{debug, warn};

use crate::cpu::Cpu;
use crate::error::FaultError;
use crate::kernel::Kernel;

/// `ESR_EL1` as reported for a data abort.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Esr {
    /// Data fault status code (bits 0..=5).
    #[bits(6)]
    pub dfsc: u8,

    /// Write not read (bit 6).
    pub wnr: bool,

    /// Remaining ISS bits (7..=24).
    #[bits(18)]
    pub iss_rest: u32,

    /// Instruction length (bit 25).
    pub il: bool,

    /// Exception class (bits 26..=31).
    #[bits(6)]
    pub ec: u8,

    #[bits(32)]
    __: u32,
}

/// Data abort from a lower exception level.
pub const EC_DATA_ABORT_LOWER: u8 = 0x24;

impl<C: Cpu, M: PhysMapper + Clone> Kernel<C, M> {
    /// Resolve a data abort of the current task at `addr`.
    ///
    /// # Errors
    /// - [`FaultError::ExceptionClass`] unless `esr` reports a data abort from
    ///   EL0; kernel-mode aborts are never demand-paged.
    /// - [`FaultError::Unhandled`] for fault classes other than translation
    ///   and permission faults.
    /// - [`FaultError::KernelAddress`] for upper-half addresses.
    /// - [`FaultError::GuardPage`] for pages registered as guards.
    /// - [`FaultError::PageQuota`] if the task owns its maximum of pages.
    /// - [`FaultError::Vmm`] if no frame or table could be allocated.
    pub fn handle_fault(&mut self, addr: u64, esr: u64) -> Result<(), FaultError> {
        let esr = Esr::from_bits(esr);
        if esr.ec() != EC_DATA_ABORT_LOWER {
            return Err(FaultError::ExceptionClass(esr.ec()));
        }
        let class = esr.dfsc() & DFSC_TYPE_MASK;
        if class != DFSC_TRANSLATION && class != DFSC_PERMISSION {
            return Err(FaultError::Unhandled(esr.dfsc()));
        }

        let va = VirtualAddress::new(addr);
        if !va.is_lower_half() {
            warn!("refusing fault at kernel address {va}");
            return Err(FaultError::KernelAddress(va));
        }

        let id = self.current_id();
        let mm = &mut self.tasks[id].mm;
        if mm.is_guard(va) {
            warn!("guard page hit at {va}");
            return Err(FaultError::GuardPage(va));
        }
        if !mm.has_user_page_capacity() {
            warn!("page quota reached at {va}");
            return Err(FaultError::PageQuota);
        }

        let had_root = mm.root().is_some();
        Vmm::new(&self.mapper, &mut self.frames).map_demand_page(mm, va)?;
        if !had_root {
            self.cpu.set_translation_root(mm.root());
        }
        debug!("demand page at {:?}", va.page::<Size4K>());
        Ok(())
    }
}
