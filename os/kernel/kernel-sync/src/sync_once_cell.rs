use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

/// A cell that is written once and read many times, usable in a `static`.
///
/// Globals of the process core (the kernel instance, the console hook, the
/// logger) live in these. A writer first claims the cell (`EMPTY -> WRITING`),
/// stores the value and then publishes it (`WRITING -> READY`). Readers only
/// ever observe `READY` values.
pub struct SyncOnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// The stored value, if one was published.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        if self.is_initialized() {
            // SAFETY: READY is only stored after the value was written.
            Some(unsafe { self.published() })
        } else {
            None
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Store `value` if the cell is empty.
    ///
    /// # Errors
    /// Hands `value` back if the cell is initialized or being initialized.
    pub fn set(&self, value: T) -> Result<&T, T> {
        if self.claim() {
            Ok(self.publish(value))
        } else {
            Err(value)
        }
    }

    /// Initialize at most once and return `&T`.
    ///
    /// A caller that loses the race spins until the winner publishes.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        if let Some(v) = self.get() {
            return v;
        }
        if self.claim() {
            return self.publish(init());
        }
        while !self.is_initialized() {
            spin_loop();
        }
        // SAFETY: READY observed above.
        unsafe { self.published() }
    }

    #[inline]
    fn claim(&self) -> bool {
        self.state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Write the value of a claimed cell and mark it `READY`.
    fn publish(&self, value: T) -> &T {
        // SAFETY: the caller won `claim`, so nobody else touches the slot.
        unsafe {
            (*self.value.get()).write(value);
        }
        self.state.store(READY, Ordering::Release);
        // SAFETY: just written.
        unsafe { self.published() }
    }

    /// # Safety
    /// The state must be `READY`.
    #[inline]
    unsafe fn published(&self) -> &T {
        unsafe { (*self.value.get()).assume_init_ref() }
    }
}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

// SAFETY: shared access only after READY; a single writer wins `claim`.
unsafe impl<T: Sync + Send> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}
