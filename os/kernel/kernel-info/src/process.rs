//! # Process Limits

/// Capacity of the task arena.
pub const NR_TASKS: usize = 64;

/// Highest PID the allocator hands out.
pub const PID_MAX: u32 = 4095;

/// Number of `u64` words backing the PID bitmap.
pub const PID_BITMAP_WORDS: usize = (PID_MAX as usize + 1).div_ceil(64);

/// User pages a single task may own (demand faults, stack, forked copies).
pub const MAX_PROCESS_PAGES: usize = 16;

/// Translation table frames a single task may own, root included.
pub const MAX_TABLE_PAGES: usize = 16;

/// Guard pages a single task may register.
pub const MAX_GUARD_PAGES: usize = 4;

/// Top of the initial user stack; the stack page sits directly below.
pub const USER_STACK_TOP: u64 = 0x0080_0000;

/// Longest string `write` copies out of user memory, NUL excluded.
pub const MAX_WRITE_LEN: usize = 1024;

/// Frames in a task's kernel stack. They are physically contiguous, so the
/// stack is contiguous in the linear map as well.
pub const THREAD_PAGES: usize = 4;

/// Size of a task's kernel stack in bytes.
pub const THREAD_SIZE: u64 = THREAD_PAGES as u64 * crate::memory::PAGE_SIZE;

const _: () = {
    assert!(PID_BITMAP_WORDS == 64);
    assert!(MAX_TABLE_PAGES >= 4);
    assert!(USER_STACK_TOP < crate::memory::USER_SPACE_END);
    assert!(USER_STACK_TOP.is_multiple_of(crate::memory::PAGE_SIZE));
    assert!(THREAD_SIZE == 16 * 1024);
};
