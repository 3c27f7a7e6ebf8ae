//! `DAIF` interrupt masking for EL1.

/// `DAIF.I`, the IRQ mask bit.
const DAIF_I: u64 = 1 << 7;

/// Mask IRQs (`msr daifset, #2`).
#[inline]
pub fn local_irq_disable() {
    unsafe { core::arch::asm!("msr daifset, #2", options(nomem, nostack, preserves_flags)) }
}

/// Unmask IRQs (`msr daifclr, #2`).
#[inline]
pub fn local_irq_enable() {
    unsafe { core::arch::asm!("msr daifclr, #2", options(nomem, nostack, preserves_flags)) }
}

/// Current `DAIF` register value.
#[inline]
#[must_use]
pub fn daif() -> u64 {
    let r: u64;
    unsafe { core::arch::asm!("mrs {}, daif", out(reg) r, options(nomem, nostack, preserves_flags)) }
    r
}

/// `true` if IRQs are currently unmasked.
#[inline]
#[must_use]
pub fn irqs_enabled() -> bool {
    daif() & DAIF_I == 0
}

/// RAII guard that masks IRQs on creation and restores the previous mask on
/// drop.
///
/// ```no_run
/// use kernel_sync::irq::{IrqGuard, irqs_enabled};
///
/// {
///     let _g = IrqGuard::new();
///     assert!(!irqs_enabled());
/// }
/// ```
pub struct IrqGuard {
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = irqs_enabled();
        if enabled {
            local_irq_disable();
        }
        Self {
            were_enabled: enabled,
        }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            local_irq_enable();
        }
    }
}
