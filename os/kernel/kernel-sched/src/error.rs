use kernel_alloc::VmmError;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{FreeError, MapError};

use crate::pid::Pid;

/// Broad classification of a failed request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No frame, PID, task slot or bookkeeping room left.
    ResourceExhausted,
    /// The request itself was malformed.
    InvalidArgument,
    /// Internal bookkeeping disagreed with the request, e.g. a double free.
    StructuralInvariantViolation,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PidError {
    #[error("pid space exhausted")]
    Exhausted,
}

/// Error returned by process creation and the other task operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    Pid(#[from] PidError),
    #[error("task table full")]
    TaskTableFull,
    #[error("out of memory")]
    OutOfMemory,
    #[error("priority must be positive, got {0}")]
    InvalidPriority(i64),
    #[error("task {0} has no kernel stack")]
    NoKernelStack(Pid),
    #[error(transparent)]
    Vmm(#[from] VmmError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Free(#[from] FreeError),
}

impl KernelError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Pid(_) | Self::TaskTableFull | Self::OutOfMemory => ErrorKind::ResourceExhausted,
            Self::InvalidPriority(_) | Self::NoKernelStack(_) => ErrorKind::InvalidArgument,
            Self::Vmm(e) => vmm_kind(*e),
            Self::Map(e) => map_kind(*e),
            Self::Free(_) => ErrorKind::StructuralInvariantViolation,
        }
    }
}

const fn map_kind(e: MapError) -> ErrorKind {
    if e.is_exhaustion() {
        ErrorKind::ResourceExhausted
    } else if let MapError::NotUserAddress(_) = e {
        ErrorKind::InvalidArgument
    } else {
        ErrorKind::StructuralInvariantViolation
    }
}

const fn vmm_kind(e: VmmError) -> ErrorKind {
    match e {
        VmmError::OutOfMemory => ErrorKind::ResourceExhausted,
        VmmError::Map(m) => map_kind(m),
        VmmError::UserFault(..) | VmmError::Unterminated => ErrorKind::InvalidArgument,
        VmmError::Free(_) => ErrorKind::StructuralInvariantViolation,
    }
}

/// Why a data abort could not be resolved. Escalation is up to the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FaultError {
    #[error("exception class {0:#04x} is not a data abort from EL0")]
    ExceptionClass(u8),
    #[error("unhandled fault status {0:#04x}")]
    Unhandled(u8),
    #[error("fault at kernel address {0}")]
    KernelAddress(VirtualAddress),
    #[error("access to guard page at {0}")]
    GuardPage(VirtualAddress),
    #[error("user page quota exhausted")]
    PageQuota,
    #[error(transparent)]
    Vmm(#[from] VmmError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;
    use kernel_vmem::TableLevel;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(KernelError::from(PidError::Exhausted).kind(), ErrorKind::ResourceExhausted);
        assert_eq!(KernelError::InvalidPriority(0).kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            KernelError::Vmm(VmmError::Map(MapError::TablePageQuota)).kind(),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(
            KernelError::Map(MapError::UnsupportedDescriptor(TableLevel::L1)).kind(),
            ErrorKind::StructuralInvariantViolation
        );
        assert_eq!(
            KernelError::Free(FreeError::DoubleFree(PhysicalAddress::new(0x0040_0000))).kind(),
            ErrorKind::StructuralInvariantViolation
        );
    }
}
