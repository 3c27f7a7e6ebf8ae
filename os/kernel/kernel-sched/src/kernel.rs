//! The kernel context: every piece of process and memory state, owned by
//! one value and reached through it.

use kernel_alloc::{BitmapFrameAlloc, Vmm, VmmError};
use kernel_info::memory::PAGING_BITMAP_WORDS;
use kernel_info::process::THREAD_PAGES;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::PhysMapper;
use log::warn;

use crate::cpu::Cpu;
use crate::error::KernelError;
use crate::pid::{Pid, PidBitmap};
use crate::task::{Task, TrapFrame};
use crate::task_table::{TaskId, TaskTable};

/// Bytes [`Kernel::copy_user_str`] stages on the kernel stack at a time.
pub const USER_COPY_CHUNK: usize = 64;

/// Frame allocator type used by the kernel context.
pub type Frames<M> = BitmapFrameAlloc<M, PAGING_BITMAP_WORDS>;

/// Process and memory state of the (single) CPU.
///
/// Operations live in [`fork`](crate::fork), [`scheduler`](crate::scheduler)
/// and [`fault`](crate::fault).
pub struct Kernel<C: Cpu, M: PhysMapper + Clone> {
    pub(crate) cpu: C,
    pub(crate) mapper: M,
    pub(crate) frames: Frames<M>,
    pub(crate) pids: PidBitmap,
    pub(crate) tasks: TaskTable,
}

impl<C: Cpu, M: PhysMapper + Clone> Kernel<C, M> {
    /// A kernel whose only task is the boot task (PID 0), which is current.
    pub fn new(cpu: C, frames: Frames<M>) -> Self {
        let mapper = frames.mapper().clone();
        Self {
            cpu,
            mapper,
            frames,
            pids: PidBitmap::new(),
            tasks: TaskTable::new(Task::init()),
        }
    }

    #[inline]
    #[must_use]
    pub const fn cpu(&self) -> &C {
        &self.cpu
    }

    #[inline]
    pub const fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    #[inline]
    #[must_use]
    pub const fn frames(&self) -> &Frames<M> {
        &self.frames
    }

    #[inline]
    #[must_use]
    pub const fn pids(&self) -> &PidBitmap {
        &self.pids
    }

    #[inline]
    #[must_use]
    pub const fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    /// The running task.
    #[must_use]
    pub fn current(&self) -> &Task {
        &self.tasks[self.tasks.current()]
    }

    pub fn current_mut(&mut self) -> &mut Task {
        let id = self.tasks.current();
        &mut self.tasks[id]
    }

    #[must_use]
    pub fn current_pid(&self) -> Pid {
        self.current().pid
    }

    #[must_use]
    pub fn task(&self, pid: Pid) -> Option<&Task> {
        self.tasks.find(pid).map(|id| &self.tasks[id])
    }

    pub fn task_mut(&mut self, pid: Pid) -> Option<&mut Task> {
        let id = self.tasks.find(pid)?;
        self.tasks.get_mut(id)
    }

    /// The trap frame of `pid`, if it has a kernel stack.
    pub fn trap_frame_mut(&mut self, pid: Pid) -> Option<&mut TrapFrame> {
        let id = self.tasks.find(pid)?;
        let pa = self.tasks[id].trap_frame()?;
        Some(unsafe { self.mapper.phys_to_mut::<TrapFrame>(pa) })
    }

    /// Hand the NUL-terminated string at `va` in the current task's address
    /// space to `sink`, in pieces of at most [`USER_COPY_CHUNK`] bytes, reading
    /// with EL0 permissions. A string longer than `limit` bytes is refused
    /// before anything reaches `sink`. Returns its length.
    ///
    /// # Errors
    /// [`VmmError::UserFault`] or [`VmmError::Unterminated`], see
    /// [`Vmm::user_str_len`].
    pub fn copy_user_str(
        &mut self,
        va: VirtualAddress,
        limit: usize,
        mut sink: impl FnMut(&[u8]),
    ) -> Result<usize, VmmError> {
        let id = self.tasks.current();
        let mm = &self.tasks[id].mm;
        let vmm = Vmm::new(&self.mapper, &mut self.frames);
        let len = vmm.user_str_len(mm, va, limit + 1)?;
        let mut chunk = [0u8; USER_COPY_CHUNK];
        let mut done = 0;
        while done < len {
            let n = (len - done).min(USER_COPY_CHUNK);
            let at = VirtualAddress::new(va.as_u64().wrapping_add(done as u64));
            vmm.read_user(mm, at, &mut chunk[..n])?;
            sink(&chunk[..n]);
            done += n;
        }
        Ok(len)
    }

    /// Memory operations over the kernel's frame pool.
    pub fn vmm(&mut self) -> Vmm<'_, M, Frames<M>> {
        Vmm::new(&self.mapper, &mut self.frames)
    }

    pub fn preempt_disable(&mut self) {
        self.current_mut().preempt_count += 1;
    }

    pub fn preempt_enable(&mut self) {
        self.current_mut().preempt_count -= 1;
    }

    /// First call of a new task, from the return trampoline: drops the
    /// preemption hold taken at creation.
    pub fn schedule_tail(&mut self) {
        self.preempt_enable();
    }

    /// Give every resource of the task in slot `id` back: address space,
    /// kernel stack, PID. Problems are logged; the rest is still released.
    pub(crate) fn release_task(&mut self, id: TaskId) -> Result<(), KernelError> {
        let task = &mut self.tasks[id];
        let mut result = Ok(());
        if let Err(e) = Vmm::new(&self.mapper, &mut self.frames).release(&mut task.mm) {
            warn!("releasing address space of {}: {e}", task.pid);
            result = Err(e.into());
        }
        if let Some(stack) = task.kernel_stack.take()
            && let Err(e) = self.frames.free_contiguous(stack.base(), THREAD_PAGES)
        {
            warn!("releasing kernel stack of {}: {e}", task.pid);
            result = result.and(Err(e.into()));
        }
        self.pids.free(task.pid);
        result
    }

    pub(crate) fn current_id(&self) -> TaskId {
        self.tasks.current()
    }
}
