//! Process creation: kernel threads and forked copies of the current task.

use kernel_alloc::Vmm;
use kernel_info::memory::{PAGE_SIZE, kernel_alias};
use kernel_info::process::{THREAD_PAGES, USER_STACK_TOP};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::PhysMapper;
use log::{info, warn};

use crate::cpu::Cpu;
use crate::error::{ErrorKind, KernelError};
use crate::kernel::Kernel;
use crate::pid::Pid;
use crate::task::{PSR_MODE_EL0T, TaskFlags, ThreadEntry, TrapFrame, trap_frame_address};
use crate::task_table::TaskId;

/// What a new task starts as.
#[derive(Copy, Clone, Debug)]
pub enum TaskKind {
    /// Runs `entry(arg)` at EL1. The function must finish with `exit` or
    /// by returning after `move_to_user_mode`.
    KernelThread { entry: ThreadEntry, arg: u64 },
    /// A copy of the current task: same trap frame with `x0 = 0`, private
    /// copies of every user page.
    UserFork,
}

impl<C: Cpu, M: PhysMapper + Clone> Kernel<C, M> {
    /// Create a task and append it to the task list. Preemption is held for
    /// the whole operation; on failure everything allocated for the task is
    /// returned.
    ///
    /// The control block is built in its arena slot and filled in through a
    /// reference, so creation never moves a [`Task`](crate::Task) across the
    /// caller's kernel stack.
    ///
    /// # Errors
    /// - [`KernelError::InvalidPriority`] unless `priority > 0`.
    /// - [`KernelError::TaskTableFull`], [`KernelError::Pid`] or
    ///   [`KernelError::OutOfMemory`] when a resource is exhausted.
    /// - [`KernelError::NoKernelStack`] when forking the boot task.
    /// - [`KernelError::Vmm`] if copying the address space fails.
    /// - A [`StructuralInvariantViolation`](crate::ErrorKind::StructuralInvariantViolation)
    ///   raised while rolling back takes precedence over the original error.
    pub fn create(&mut self, kind: TaskKind, priority: i64) -> Result<Pid, KernelError> {
        if priority <= 0 {
            return Err(KernelError::InvalidPriority(priority));
        }
        self.preempt_disable();
        let result = self.create_task(kind, priority);
        self.preempt_enable();
        result
    }

    fn create_task(&mut self, kind: TaskKind, priority: i64) -> Result<Pid, KernelError> {
        if self.tasks.is_full() {
            return Err(KernelError::TaskTableFull);
        }
        let pid = self.pids.allocate()?;
        let Some(id) = self.tasks.reserve(pid, priority) else {
            self.pids.free(pid);
            return Err(KernelError::TaskTableFull);
        };
        if let Err(e) = self.prepare(id, kind) {
            warn!("creating task {pid} failed: {e}");
            return Err(self.roll_back(id, e));
        }
        self.tasks.link_tail(id);
        info!("created task {pid} in slot {id}, priority {priority}");
        Ok(pid)
    }

    /// Release a reserved, unlinked task after `cause` stopped its creation.
    fn roll_back(&mut self, id: TaskId, cause: KernelError) -> KernelError {
        let released = self.release_task(id);
        self.tasks.vacate(id);
        match released {
            Err(e) if e.kind() == ErrorKind::StructuralInvariantViolation => e,
            _ => cause,
        }
    }

    fn prepare(&mut self, id: TaskId, kind: TaskKind) -> Result<(), KernelError> {
        let stack = self
            .frames
            .allocate_contiguous(THREAD_PAGES)
            .ok_or(KernelError::OutOfMemory)?;
        let regs = trap_frame_address(stack);
        let trampoline = self.cpu.return_trampoline();

        let task = &mut self.tasks[id];
        task.kernel_stack = Some(stack);
        task.context.pc = trampoline;
        task.context.sp = kernel_alias(regs).as_u64();

        match kind {
            TaskKind::KernelThread { entry, arg } => {
                task.flags = TaskFlags::KTHREAD;
                task.context.x19 = entry as usize as u64;
                task.context.x20 = arg;
            }
            TaskKind::UserFork => {
                let (parent, child) = self.tasks.pair_mut(self.tasks.current(), id);
                let parent_regs = parent
                    .trap_frame()
                    .ok_or(KernelError::NoKernelStack(parent.pid))?;
                unsafe {
                    let frame = self.mapper.phys_to_mut::<TrapFrame>(regs);
                    *frame = *self.mapper.phys_to_mut::<TrapFrame>(parent_regs);
                    frame.regs[0] = 0;
                }
                Vmm::new(&self.mapper, &mut self.frames).copy_address_space(&parent.mm, &mut child.mm)?;
            }
        }
        Ok(())
    }

    /// Prepare the current task's trap frame so that the next exception
    /// return enters EL0 at `pc`, with a fresh stack page below
    /// `USER_STACK_TOP` and a guard page under it.
    ///
    /// # Errors
    /// - [`KernelError::NoKernelStack`] for the boot task.
    /// - [`KernelError::Vmm`] / [`KernelError::Map`] if the stack cannot be
    ///   mapped. The trap frame is left untouched.
    pub fn move_to_user_mode(&mut self, pc: u64) -> Result<(), KernelError> {
        let id = self.current_id();
        let task = &self.tasks[id];
        let regs = task.trap_frame().ok_or(KernelError::NoKernelStack(task.pid))?;

        let stack_page = VirtualAddress::new(USER_STACK_TOP - PAGE_SIZE);
        let guard = VirtualAddress::new(USER_STACK_TOP - 2 * PAGE_SIZE);
        let mm = &mut self.tasks[id].mm;
        Vmm::new(&self.mapper, &mut self.frames).allocate_user_backed(mm, stack_page)?;
        mm.map_guard(&self.mapper, &mut self.frames, guard)?;

        let frame = unsafe { self.mapper.phys_to_mut::<TrapFrame>(regs) };
        *frame = TrapFrame::zeroed();
        frame.pc = pc;
        frame.pstate = PSR_MODE_EL0T;
        frame.sp = USER_STACK_TOP;

        self.cpu.set_translation_root(self.tasks[id].mm.root());
        info!("task {} entering user mode at {pc:#x}", self.tasks[id].pid);
        Ok(())
    }
}
