//! # Ready List
//!
//! Index-based intrusive doubly-linked list over the TCB arena. Links are
//! `TaskId`s rather than pointers, so membership cannot alias.
//!
//! Every created user task is linked exactly once and never unlinked:
//! blocking does not remove a task, it only changes the state the
//! scheduler filters on. Insertion is at the head, so iteration order is
//! most-recently-created first, which decides priority ties.

use crate::config::TASK_SLOTS;
use crate::task::TaskId;

#[derive(Debug, Clone, Copy)]
struct Links {
    next: Option<TaskId>,
    prev: Option<TaskId>,
    linked: bool,
}

impl Links {
    const UNLINKED: Links = Links {
        next: None,
        prev: None,
        linked: false,
    };
}

pub struct ReadyList {
    head: Option<TaskId>,
    links: [Links; TASK_SLOTS],
    len: usize,
}

impl ReadyList {
    pub const fn new() -> Self {
        Self {
            head: None,
            links: [Links::UNLINKED; TASK_SLOTS],
            len: 0,
        }
    }

    /// Link `id` as the new head. Returns `false` if it is already a member.
    pub fn push_front(&mut self, id: TaskId) -> bool {
        if self.links[id.index()].linked {
            return false;
        }
        let old_head = self.head;
        self.links[id.index()] = Links {
            next: old_head,
            prev: None,
            linked: true,
        };
        if let Some(old) = old_head {
            self.links[old.index()].prev = Some(id);
        }
        self.head = Some(id);
        self.len += 1;
        true
    }

    pub fn next(&self, id: TaskId) -> Option<TaskId> {
        self.links[id.index()].next
    }

    pub fn prev(&self, id: TaskId) -> Option<TaskId> {
        self.links[id.index()].prev
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Members from head to tail.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }
}

impl Default for ReadyList {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a> {
    list: &'a ReadyList,
    cursor: Option<TaskId>,
}

impl Iterator for Iter<'_> {
    type Item = TaskId;

    fn next(&mut self) -> Option<TaskId> {
        let id = self.cursor?;
        self.cursor = self.list.next(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[test]
    fn test_push_front_orders_newest_first() {
        let mut list = ReadyList::new();
        assert_eq!(list.len(), 0);
        assert_eq!(list.iter().next(), None);
        list.push_front(TaskId(0));
        list.push_front(TaskId(1));
        list.push_front(TaskId(2));

        let order: Vec<_> = list.iter().collect();
        assert_eq!(order, [TaskId(2), TaskId(1), TaskId(0)]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.prev(TaskId(2)), None);
    }

    #[test]
    fn test_links_are_doubly_consistent() {
        let mut list = ReadyList::new();
        for i in 0..4 {
            list.push_front(TaskId(i));
        }
        assert_eq!(list.prev(TaskId(3)), None);
        for id in list.iter() {
            if let Some(next) = list.next(id) {
                assert_eq!(list.prev(next), Some(id));
            }
        }
        assert_eq!(list.next(TaskId(0)), None);
    }

    #[test]
    fn test_double_insert_is_rejected() {
        let mut list = ReadyList::new();
        assert!(list.push_front(TaskId(1)));
        assert!(!list.push_front(TaskId(1)));
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().collect::<Vec<_>>(), [TaskId(1)]);
    }
}
