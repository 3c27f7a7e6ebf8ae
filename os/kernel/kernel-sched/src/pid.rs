//! PID allocation: one bit per identifier in `0..=PID_MAX`.

use core::fmt;

use kernel_info::process::{PID_BITMAP_WORDS, PID_MAX};
use log::debug;

use crate::error::PidError;

/// Process identifier.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u32);

impl Pid {
    /// The boot task.
    pub const INIT: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Negative or too large for a `Pid`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PidOutOfRange(pub i64);

impl TryFrom<i64> for Pid {
    type Error = PidOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value).map(Self).map_err(|_| PidOutOfRange(value))
    }
}

/// Allocation bitmap over the PID space. PID 0 is taken from the start.
pub struct PidBitmap {
    words: [u64; PID_BITMAP_WORDS],
}

impl PidBitmap {
    #[must_use]
    pub const fn new() -> Self {
        let mut words = [0; PID_BITMAP_WORDS];
        words[0] = 1;
        Self { words }
    }

    /// Take the lowest free PID.
    ///
    /// # Errors
    /// [`PidError::Exhausted`] if every PID up to `PID_MAX` is in use.
    pub fn allocate(&mut self) -> Result<Pid, PidError> {
        let (word, bits) = self
            .words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != u64::MAX)
            .ok_or(PidError::Exhausted)?;
        let bit = bits.trailing_ones();
        let pid = u32::try_from(word * 64)
            .ok()
            .and_then(|base| base.checked_add(bit))
            .filter(|pid| *pid <= PID_MAX)
            .ok_or(PidError::Exhausted)?;
        self.words[word] |= 1 << bit;
        Ok(Pid(pid))
    }

    /// Release `pid`. Out-of-range values and PID 0 are ignored.
    pub fn free(&mut self, pid: Pid) {
        if pid == Pid::INIT || pid.0 > PID_MAX {
            debug!("ignoring free of pid {pid}");
            return;
        }
        let i = pid.0 as usize;
        self.words[i / 64] &= !(1 << (i % 64));
    }

    #[must_use]
    pub const fn is_allocated(&self, pid: Pid) -> bool {
        let i = pid.0 as usize;
        pid.0 <= PID_MAX && self.words[i / 64] & (1 << (i % 64)) != 0
    }
}

impl Default for PidBitmap {
    fn default() -> Self {
        Self::new()
    }
}
