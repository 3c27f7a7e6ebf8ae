//! # Priority-Decay Scheduling
//!
//! Every task carries a `counter` of remaining time slices. The timer tick
//! takes one slice from the current task; once it is used up the task with
//! the most slices left runs next. When no runnable task has any left, every
//! task is refilled with `counter / 2 + priority`, so higher priorities get
//! proportionally more slices and nothing with a positive priority starves.

use kernel_vmem::PhysMapper;
use log::{debug, info, warn};

use crate::cpu::Cpu;
use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::task::TaskState;
use crate::task_table::TaskId;

impl<C: Cpu, M: PhysMapper + Clone> Kernel<C, M> {
    /// The runnable task with the most slices left, earliest in list order
    /// on ties. Refills all counters first if none has any left.
    ///
    /// `None` only if no task is runnable at all.
    pub fn pick_next(&mut self) -> Option<TaskId> {
        loop {
            let mut best: Option<(TaskId, i64)> = None;
            for (id, task) in self.tasks.iter() {
                if task.is_running() && best.is_none_or(|(_, c)| task.counter > c) {
                    best = Some((id, task.counter));
                }
            }
            let (id, counter) = best?;
            if counter > 0 {
                return Some(id);
            }
            self.decay();
        }
    }

    /// One refill round over every task.
    ///
    /// A counter driven below zero by ticks under a preemption hold counts as
    /// empty, so every pass still raises it by the full priority.
    pub fn decay(&mut self) {
        for task in self.tasks.slots_mut() {
            task.counter = (task.counter.max(0) >> 1) + task.priority;
        }
    }

    /// Give up the rest of the current slice.
    pub fn schedule(&mut self) {
        self.current_mut().counter = 0;
        self.reschedule();
    }

    /// Timer interrupt: charge one slice to the current task and switch away
    /// once its slices are used up, unless preemption is disabled.
    pub fn tick(&mut self) {
        let task = self.current_mut();
        task.counter -= 1;
        if task.counter > 0 || task.preempt_count > 0 {
            return;
        }
        task.counter = 0;
        self.cpu.enable_irq();
        self.reschedule();
        self.cpu.disable_irq();
    }

    /// Terminate the current task. It stays in the list as a zombie until
    /// [`reap_zombies`](Self::reap_zombies) runs from another task.
    pub fn exit(&mut self) {
        self.preempt_disable();
        let task = self.current_mut();
        task.state = TaskState::Zombie;
        info!("task {} exited", task.pid);
        self.preempt_enable();
        self.schedule();
    }

    /// Set the current task's priority. Values `<= 0` are ignored.
    pub fn set_priority(&mut self, priority: i64) {
        if priority <= 0 {
            debug!("ignoring priority {priority}");
            return;
        }
        self.current_mut().priority = priority;
    }

    /// Unlink every zombie other than the current and the boot task and release its
    /// address space, kernel stack and PID. Returns the number reaped.
    ///
    /// # Errors
    /// The first release failure; the remaining zombies are still reaped.
    pub fn reap_zombies(&mut self) -> Result<usize, KernelError> {
        let mut reaped = 0;
        let mut result = Ok(());
        while let Some(id) = self
            .tasks
            .iter()
            .find(|(id, t)| {
                !t.is_running() && *id != TaskId::HEAD && *id != self.tasks.current()
            })
            .map(|(id, _)| id)
        {
            if !self.tasks.unlink(id) {
                break;
            }
            let pid = self.tasks[id].pid;
            result = result.and(self.release_task(id));
            self.tasks.vacate(id);
            debug!("reaped task {pid}");
            reaped += 1;
        }
        result.map(|()| reaped)
    }

    fn reschedule(&mut self) {
        let prev = self.current_id();
        self.tasks[prev].preempt_count += 1;
        match self.pick_next() {
            Some(next) => self.switch_to(next),
            None => warn!("no runnable task"),
        }
        // Runs when `prev` is resumed.
        self.tasks[prev].preempt_count -= 1;
    }

    fn switch_to(&mut self, next: TaskId) {
        let prev = self.current_id();
        if prev == next {
            return;
        }
        self.tasks.set_current(next);
        self.cpu.set_translation_root(self.tasks[next].mm.root());
        let prev_ctx = &raw mut self.tasks[prev].context;
        let next_ctx = &raw const self.tasks[next].context;
        unsafe { self.cpu.switch_context(prev_ctx, next_ctx) };
    }
}

#[cfg(test)]
mod tests {
    use kernel_alloc::BitmapFrameAlloc;
    use kernel_alloc::phys_mapper::HostMemory;
    use kernel_memory_addresses::PhysicalAddress;

    use super::*;
    use crate::cpu::HostCpu;
    use crate::fork::TaskKind;
    use crate::pid::Pid;

    extern "C" fn idle(_: u64) {}

    fn kernel() -> Kernel<HostCpu, HostMemory> {
        let base = PhysicalAddress::new(0x0040_0000);
        let ram = HostMemory::new(base, 32);
        Kernel::new(HostCpu::new(), BitmapFrameAlloc::new(ram, base, 32))
    }

    fn spawn(k: &mut Kernel<HostCpu, HostMemory>, priority: i64) -> Pid {
        k.create(
            TaskKind::KernelThread {
                entry: idle,
                arg: 0,
            },
            priority,
        )
        .unwrap()
    }

    #[test]
    fn decay_halves_and_adds_priority() {
        let mut k = kernel();
        let a = spawn(&mut k, 3);
        k.task_mut(a).unwrap().counter = 5;
        k.decay();
        assert_eq!(k.task(a).unwrap().counter, 2 + 3);
        assert_eq!(k.task(Pid::INIT).unwrap().counter, 1);
    }

    #[test]
    fn repeated_decay_settles_below_twice_the_priority() {
        let mut k = kernel();
        let a = spawn(&mut k, 3);
        k.task_mut(a).unwrap().counter = 0;
        let counters: Vec<i64> = (0..5)
            .map(|_| {
                k.decay();
                k.task(a).unwrap().counter
            })
            .collect();
        assert_eq!(counters, [3, 4, 5, 5, 5]);
    }

    #[test]
    fn overdrawn_counter_still_gets_a_refill() {
        let mut k = kernel();
        k.current_mut().counter = 1;
        k.preempt_disable();
        k.tick();
        k.tick();
        k.tick();
        assert_eq!(k.current().counter, -2);
        k.preempt_enable();

        // the boot task is the only one and has priority 1
        let next = k.pick_next().unwrap();
        assert_eq!(next, TaskId::HEAD);
        assert_eq!(k.current().counter, 1);
    }

    #[test]
    fn zero_counters_trigger_a_refill() {
        let mut k = kernel();
        let a = spawn(&mut k, 2);
        let b = spawn(&mut k, 5);
        for pid in [Pid::INIT, a, b] {
            k.task_mut(pid).unwrap().counter = 0;
        }
        let next = k.pick_next().unwrap();
        assert_eq!(k.tasks()[next].pid, b);
        assert_eq!(k.task(a).unwrap().counter, 2);
        assert_eq!(k.task(b).unwrap().counter, 5);
    }

    #[test]
    fn ties_go_to_the_earlier_task() {
        let mut k = kernel();
        let a = spawn(&mut k, 4);
        let _b = spawn(&mut k, 4);
        let next = k.pick_next().unwrap();
        assert_eq!(k.tasks()[next].pid, a);
    }

    #[test]
    fn zombies_are_never_picked() {
        let mut k = kernel();
        let a = spawn(&mut k, 9);
        k.task_mut(a).unwrap().state = TaskState::Zombie;
        let next = k.pick_next().unwrap();
        assert_eq!(k.tasks()[next].pid, Pid::INIT);
    }

    #[test]
    fn tick_respects_preempt_hold() {
        let mut k = kernel();
        spawn(&mut k, 4);
        k.current_mut().counter = 1;
        k.preempt_disable();
        k.tick();
        assert_eq!(k.current_pid(), Pid::INIT);
        assert_eq!(k.cpu().switches(), 0);
        assert_eq!(k.current().counter, 0);

        k.preempt_enable();
        k.current_mut().counter = 1;
        k.tick();
        assert_ne!(k.current_pid(), Pid::INIT);
        assert_eq!(k.cpu().switches(), 1);
        assert_eq!(k.cpu().irq_enables(), 1);
        assert!(!k.cpu().irq_enabled());
    }

    #[test]
    fn tick_keeps_running_while_slices_remain() {
        let mut k = kernel();
        spawn(&mut k, 4);
        k.current_mut().counter = 3;
        k.tick();
        assert_eq!(k.current().counter, 2);
        assert_eq!(k.cpu().switches(), 0);
    }

    #[test]
    fn priority_changes_ignore_non_positive_values() {
        let mut k = kernel();
        k.set_priority(7);
        k.set_priority(0);
        k.set_priority(-3);
        assert_eq!(k.current().priority, 7);
    }

    #[test]
    fn switch_saves_the_outgoing_context() {
        let mut k = kernel();
        let a = spawn(&mut k, 4);
        k.schedule();
        assert_eq!(k.current_pid(), a);
        assert!(k.cpu_mut().take_fresh_entry());
        assert_ne!(k.task(Pid::INIT).unwrap().context.pc, 0);
        // the boot task's own hold is balanced, the new task still holds one
        assert_eq!(k.task(Pid::INIT).unwrap().preempt_count, 0);
        assert_eq!(k.current().preempt_count, 1);
        k.schedule_tail();
        assert_eq!(k.current().preempt_count, 0);
    }
}
