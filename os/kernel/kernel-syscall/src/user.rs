//! User-side call stubs. These run at EL0 and trap into the table through
//! `svc #0`.

use core::arch::asm;

use crate::Sysno;

#[inline]
unsafe fn syscall1(nr: Sysno, arg: u64) -> u64 {
    let ret: u64;
    unsafe {
        asm!(
            "svc #0",
            in("x8") nr as u64,
            inlateout("x0") arg => ret,
            options(nostack)
        );
    }
    ret
}

/// Print a NUL-terminated string.
///
/// # Safety
/// `text` must end in a NUL byte.
pub unsafe fn write(text: &[u8]) -> u64 {
    unsafe { syscall1(Sysno::Write, text.as_ptr() as u64) }
}

/// Duplicate the calling task. Returns the child PID in the parent and 0 in
/// the child.
#[must_use]
pub fn fork() -> u64 {
    unsafe { syscall1(Sysno::Fork, 0) }
}

pub fn exit() -> ! {
    unsafe { syscall1(Sysno::Exit, 0) };
    loop {
        core::hint::spin_loop();
    }
}

#[must_use]
pub fn getpid() -> u64 {
    unsafe { syscall1(Sysno::GetPid, 0) }
}

#[allow(clippy::cast_sign_loss)]
pub fn set_priority(priority: i64) {
    unsafe { syscall1(Sysno::SetPriority, priority as u64) };
}
