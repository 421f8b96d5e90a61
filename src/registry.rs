//! # Task Registry
//!
//! Fixed-capacity arena of TCBs. User tasks take slots `0..MAX_TASKS` in
//! creation order; the idle task owns the reserved slot `MAX_TASKS`, which
//! does not count against the user capacity. Slots are never reclaimed.

use crate::config::{MAX_TASKS, TASK_SLOTS};
use crate::error::KernelError;
use crate::task::{StackRegion, TaskControlBlock, TaskId};

pub struct TaskRegistry<C: Copy> {
    slots: [TaskControlBlock<C>; TASK_SLOTS],
    count: usize,
}

impl<C: Copy> TaskRegistry<C> {
    pub const fn new(null_context: C) -> Self {
        Self {
            slots: [TaskControlBlock::empty(null_context); TASK_SLOTS],
            count: 0,
        }
    }

    /// Slot the next user task will occupy, or `CapacityExhausted`.
    pub fn next_free(&self) -> Result<TaskId, KernelError> {
        if self.count >= MAX_TASKS {
            return Err(KernelError::CapacityExhausted);
        }
        Ok(TaskId(self.count))
    }

    /// Populate the next free user slot.
    pub fn insert(
        &mut self,
        context: C,
        stack: StackRegion,
        name: &str,
        priority: u32,
    ) -> Result<TaskId, KernelError> {
        let id = self.next_free()?;
        self.slots[id.index()].init(context, stack, name, priority);
        self.count += 1;
        Ok(id)
    }

    /// Populate the reserved idle slot.
    pub fn install_idle(&mut self, context: C, stack: StackRegion) -> Result<(), KernelError> {
        let idle = &mut self.slots[TaskId::IDLE.index()];
        if idle.active {
            return Err(KernelError::AlreadyStarted);
        }
        idle.init(context, stack, "idle", 0);
        Ok(())
    }

    pub fn has_idle(&self) -> bool {
        self.slots[TaskId::IDLE.index()].active
    }

    /// Number of user tasks created.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskControlBlock<C>> {
        self.slots.get(id.index()).filter(|tcb| tcb.active)
    }

    #[inline]
    pub fn tcb(&self, id: TaskId) -> &TaskControlBlock<C> {
        &self.slots[id.index()]
    }

    #[inline]
    pub fn tcb_mut(&mut self, id: TaskId) -> &mut TaskControlBlock<C> {
        &mut self.slots[id.index()]
    }

    /// Raw pointer to a slot's saved context, for the switch primitive.
    /// The arena never moves while the scheduler is alive.
    #[inline]
    pub fn context_ptr(&mut self, id: TaskId) -> *mut C {
        &mut self.slots[id.index()].context
    }

    /// Created user tasks, in creation order.
    pub fn user_tasks(&self) -> impl Iterator<Item = (TaskId, &TaskControlBlock<C>)> {
        self.slots[..self.count]
            .iter()
            .enumerate()
            .map(|(i, tcb)| (TaskId(i), tcb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;

    fn region() -> StackRegion {
        StackRegion::EMPTY
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let mut reg = TaskRegistry::new(0usize);
        assert_eq!(reg.insert(1, region(), "a", 1), Ok(TaskId(0)));
        assert_eq!(reg.insert(2, region(), "b", 2), Ok(TaskId(1)));
        assert_eq!(reg.count(), 2);
        assert_eq!(reg.tcb(TaskId(1)).context, 2);
        assert_eq!(reg.tcb(TaskId(1)).state, TaskState::Ready);
    }

    #[test]
    fn test_capacity_exhaustion_leaves_existing_tasks() {
        let mut reg = TaskRegistry::new(0usize);
        for i in 0..MAX_TASKS {
            reg.insert(i, region(), "t", i as u32).unwrap();
        }
        assert_eq!(reg.next_free(), Err(KernelError::CapacityExhausted));
        assert_eq!(
            reg.insert(99, region(), "extra", 9),
            Err(KernelError::CapacityExhausted)
        );
        assert_eq!(reg.count(), MAX_TASKS);
        for (id, tcb) in reg.user_tasks() {
            assert_eq!(tcb.context, id.index());
            assert_eq!(tcb.priority, id.index() as u32);
        }
        assert!(!reg.has_idle());
    }

    #[test]
    fn test_idle_slot_is_outside_user_count() {
        let mut reg = TaskRegistry::new(0usize);
        reg.install_idle(7, region()).unwrap();
        assert!(reg.has_idle());
        assert_eq!(reg.count(), 0);
        assert_eq!(reg.get(TaskId::IDLE).map(|t| t.name.as_str()), Some("idle"));
        assert_eq!(reg.install_idle(8, region()), Err(KernelError::AlreadyStarted));
        assert_eq!(reg.tcb(TaskId::IDLE).context, 7);
    }

    #[test]
    fn test_get_skips_unallocated_slots() {
        let reg = TaskRegistry::new(0usize);
        assert!(reg.get(TaskId(0)).is_none());
        assert!(reg.get(TaskId(MAX_TASKS + 5)).is_none());
    }
}
