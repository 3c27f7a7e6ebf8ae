//! Fixed-capacity bookkeeping lists.

/// The list is full.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("capacity of {capacity} entries exhausted")]
pub struct CapacityError {
    pub capacity: usize,
}

/// An append-only list of at most `N` copyable entries, stored inline.
#[derive(Clone)]
pub struct BoundedVec<T: Copy, const N: usize> {
    items: [Option<T>; N],
    len: usize,
}

impl<T: Copy, const N: usize> BoundedVec<T, N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: [None; N],
            len: 0,
        }
    }

    /// Append `value`.
    ///
    /// # Errors
    /// [`CapacityError`] once `N` entries are stored; the list is unchanged.
    pub const fn push(&mut self, value: T) -> Result<(), CapacityError> {
        if self.len == N {
            return Err(CapacityError { capacity: N });
        }
        self.items[self.len] = Some(value);
        self.len += 1;
        Ok(())
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Free slots left.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        N - self.len
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.items[..self.len].iter().flatten().copied()
    }

    /// Remove every entry, handing them to `f` in insertion order.
    pub fn drain_with(&mut self, mut f: impl FnMut(T)) {
        for slot in &mut self.items[..self.len] {
            if let Some(v) = slot.take() {
                f(v);
            }
        }
        self.len = 0;
    }
}

impl<T: Copy, const N: usize> Default for BoundedVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
