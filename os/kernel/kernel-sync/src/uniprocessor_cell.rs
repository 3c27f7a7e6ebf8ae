use core::cell::UnsafeCell;

/// Interior mutability for state owned by the (single) CPU rather than by a
/// task.
///
/// Kernel code reaches the cell from task context and from the timer IRQ.
/// On one core with the scheduler's preemption counter honored, those
/// accesses never overlap in a way that observes a half-done update, but the
/// compiler cannot know that, so access is `unsafe`.
pub struct UniprocessorCell<T> {
    value: UnsafeCell<T>,
}

impl<T> UniprocessorCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
        }
    }

    /// Mutable access to the contents.
    ///
    /// # Safety
    /// - Only one core may ever call this.
    /// - The caller must not keep the reference across a point where another
    ///   context (IRQ or another task) could obtain its own, unless that
    ///   context only touches state the caller has handed over, such as the
    ///   run queue during a context switch.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut T {
        unsafe { &mut *self.value.get() }
    }

    /// Exclusive access through an exclusive borrow of the cell.
    #[inline]
    pub const fn get_mut_exclusive(&mut self) -> &mut T {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

unsafe impl<T: Send> Sync for UniprocessorCell<T> {}
