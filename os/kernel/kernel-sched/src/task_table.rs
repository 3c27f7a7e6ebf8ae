//! Fixed-capacity task arena with an intrusive singly linked list.
//!
//! Slots are addressed by [`TaskId`]; the list order (creation order) is
//! what the scheduler scans. Slot 0 holds the boot task and is the list head
//! for the lifetime of the kernel.

use core::fmt;
use core::ops::{Index, IndexMut};

use kernel_info::process::NR_TASKS;

use crate::pid::Pid;
use crate::task::Task;

/// Stable handle of an arena slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(usize);

impl TaskId {
    /// The boot task's slot, head of the list.
    pub const HEAD: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct TaskTable {
    slots: [Option<Task>; NR_TASKS],
    current: TaskId,
    len: usize,
}

impl TaskTable {
    /// A table holding only `init`, which becomes current.
    #[must_use]
    pub fn new(init: Task) -> Self {
        let mut slots = [const { None }; NR_TASKS];
        slots[TaskId::HEAD.0] = Some(init);
        Self {
            slots,
            current: TaskId::HEAD,
            len: 1,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == NR_TASKS
    }

    /// The task running on the CPU.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> TaskId {
        self.current
    }

    pub(crate) const fn set_current(&mut self, id: TaskId) {
        self.current = id;
    }

    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.slots.get(id.0)?.as_ref()
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    /// Slot of the live task with `pid`.
    #[must_use]
    pub fn find(&self, pid: Pid) -> Option<TaskId> {
        self.iter().find(|(_, t)| t.pid == pid).map(|(id, _)| id)
    }

    /// Tasks in list order.
    #[must_use]
    pub const fn iter(&self) -> Iter<'_> {
        Iter {
            table: self,
            next: Some(TaskId::HEAD),
        }
    }

    /// Every task, in slot order.
    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.slots.iter_mut().flatten()
    }

    /// Build a fresh task for `pid` in the lowest free slot. The task is not
    /// linked, so the scheduler does not see it until
    /// [`link_tail`](Self::link_tail). `None` if every slot is taken.
    pub(crate) fn reserve(&mut self, pid: Pid, priority: i64) -> Option<TaskId> {
        let free = self.slots.iter().position(Option::is_none)?;
        self.slots[free] = Some(Task::new(pid, priority));
        self.len += 1;
        Some(TaskId(free))
    }

    /// Link a reserved task at the tail of the list.
    pub(crate) fn link_tail(&mut self, id: TaskId) {
        let mut tail = TaskId::HEAD;
        while let Some(next) = self[tail].next {
            tail = next;
        }
        self[id].next = None;
        self[tail].next = Some(id);
    }

    /// Remove `id` from the list; its slot stays occupied until
    /// [`vacate`](Self::vacate). The head and the current task cannot be
    /// removed.
    pub(crate) fn unlink(&mut self, id: TaskId) -> bool {
        if id == TaskId::HEAD || id == self.current {
            return false;
        }
        let mut prev = TaskId::HEAD;
        loop {
            match self[prev].next {
                Some(next) if next == id => break,
                Some(next) => prev = next,
                None => return false,
            }
        }
        self[prev].next = self[id].next.take();
        true
    }

    /// Drop the task in an unlinked slot.
    pub(crate) fn vacate(&mut self, id: TaskId) {
        let slot = &mut self.slots[id.0];
        if slot.is_some() {
            *slot = None;
            self.len -= 1;
        }
    }

    /// `src` for reading and `dst` for writing at the same time.
    ///
    /// # Panics
    /// Like indexing, if either slot is empty, and if `src == dst`.
    pub(crate) fn pair_mut(&mut self, src: TaskId, dst: TaskId) -> (&Task, &mut Task) {
        assert_ne!(src, dst, "task {src} paired with itself");
        let (low, high) = self.slots.split_at_mut(src.0.max(dst.0));
        let (first, second) = (&mut low[src.0.min(dst.0)], &mut high[0]);
        let (src_slot, dst_slot) = if src.0 < dst.0 { (first, second) } else { (second, first) };
        match (src_slot.as_ref(), dst_slot.as_mut()) {
            (Some(s), Some(d)) => (s, d),
            _ => panic!("no task in slot {src} or {dst}"),
        }
    }
}

impl Index<TaskId> for TaskTable {
    type Output = Task;

    fn index(&self, id: TaskId) -> &Task {
        match self.get(id) {
            Some(task) => task,
            None => panic!("no task in slot {id}"),
        }
    }
}

impl IndexMut<TaskId> for TaskTable {
    fn index_mut(&mut self, id: TaskId) -> &mut Task {
        match self.get_mut(id) {
            Some(task) => task,
            None => panic!("no task in slot {id}"),
        }
    }
}

/// List-order iterator, see [`TaskTable::iter`].
pub struct Iter<'a> {
    table: &'a TaskTable,
    next: Option<TaskId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (TaskId, &'a Task);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let task = self.table.get(id)?;
        self.next = task.next;
        Some((id, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pids(table: &TaskTable) -> Vec<u32> {
        table.iter().map(|(_, t)| t.pid.as_u32()).collect()
    }

    fn add(table: &mut TaskTable, pid: u32) -> TaskId {
        let id = table.reserve(Pid::new(pid), 1).unwrap();
        table.link_tail(id);
        id
    }

    #[test]
    fn appends_in_creation_order() {
        let mut table = TaskTable::new(Task::init());
        for pid in 1..=3 {
            add(&mut table, pid);
        }
        assert_eq!(pids(&table), [0, 1, 2, 3]);
        assert_eq!(table.len(), 4);
        assert_eq!(table.find(Pid::new(2)), Some(TaskId(2)));
    }

    #[test]
    fn reserved_tasks_are_invisible_until_linked() {
        let mut table = TaskTable::new(Task::init());
        let id = table.reserve(Pid::new(7), 3).unwrap();
        assert_eq!(pids(&table), [0]);
        assert_eq!(table[id].counter, 3);
        assert_eq!(table[id].preempt_count, 1);

        table.vacate(id);
        assert_eq!(table.len(), 1);
        assert!(table.get(id).is_none());
    }

    #[test]
    fn unlink_relinks_and_vacate_frees_the_slot() {
        let mut table = TaskTable::new(Task::init());
        let a = add(&mut table, 1);
        add(&mut table, 2);

        assert!(table.unlink(a));
        assert_eq!(pids(&table), [0, 2]);
        assert_eq!(table[a].pid, Pid::new(1));
        table.vacate(a);

        // the freed slot is reused, but the new task still goes to the tail
        let c = add(&mut table, 3);
        assert_eq!(c, a);
        assert_eq!(pids(&table), [0, 2, 3]);
    }

    #[test]
    fn head_and_current_stay_linked() {
        let mut table = TaskTable::new(Task::init());
        let a = add(&mut table, 1);
        table.set_current(a);
        assert!(!table.unlink(a));
        assert!(!table.unlink(TaskId::HEAD));
    }

    #[test]
    fn pairs_borrow_two_slots() {
        let mut table = TaskTable::new(Task::init());
        let a = add(&mut table, 1);
        let b = add(&mut table, 2);
        let (src, dst) = table.pair_mut(b, a);
        dst.priority = src.priority + 4;
        assert_eq!(table[a].priority, 5);
    }

    #[test]
    fn full_table_refuses_reservations() {
        let mut table = TaskTable::new(Task::init());
        for pid in 1..NR_TASKS {
            add(&mut table, u32::try_from(pid).unwrap());
        }
        assert!(table.is_full());
        assert!(table.reserve(Pid::new(999), 1).is_none());
    }
}
