//! # Task Control Block
//!
//! Defines the task model for TickOS: identity, execution state, the
//! caller-owned stack region and the `Runnable` capability a task executes.
//!
//! TCBs are plain `Copy` records stored in the registry arena and addressed
//! by a stable `TaskId`. A TCB is populated once by task creation and never
//! reclaimed.

use core::fmt;

use crate::arch::TaskEntry;
use crate::config::TASK_NAME_LEN;

// ---------------------------------------------------------------------------
// Task identity
// ---------------------------------------------------------------------------

/// Stable index of a task in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// The reserved idle slot, placed after the user slots.
    pub const IDLE: TaskId = TaskId(crate::config::MAX_TASKS);

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_idle(self) -> bool {
        self.0 == Self::IDLE.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_idle() {
            write!(f, "idle")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌──────────┐     selected        ┌─────────┐
///   │  Ready   │ ──────────────────► │ Running │
///   └──────────┘                     └─────────┘
///        ▲  ▲        preempted            │
///        │  └─────────────────────────────┤
///        │                                │ delay(n)
///        │    countdown reaches 0         ▼
///        │                          ┌──────────┐
///        └───────────────────────── │ Blocked  │
///                                   └──────────┘
/// ```
///
/// `Suspended` is reserved: no operation enters or leaves it, and the
/// scheduler never selects a task in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Blocked,
    Suspended,
}

impl TaskState {
    /// Whether the scheduler may pick a task in this state.
    #[inline]
    pub const fn is_eligible(self) -> bool {
        matches!(self, TaskState::Ready | TaskState::Running)
    }
}

// ---------------------------------------------------------------------------
// Task name
// ---------------------------------------------------------------------------

/// Short fixed-capacity label. Longer names are truncated to
/// `TASK_NAME_LEN - 1` bytes, backing off to a UTF-8 character boundary.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TaskName {
    bytes: [u8; TASK_NAME_LEN],
    len: u8,
}

impl TaskName {
    pub const EMPTY: TaskName = TaskName {
        bytes: [0; TASK_NAME_LEN],
        len: 0,
    };

    pub fn new(name: &str) -> Self {
        let mut len = name.len().min(TASK_NAME_LEN - 1);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        let mut bytes = [0u8; TASK_NAME_LEN];
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        // Always a prefix of a `str` cut on a char boundary
        core::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Debug for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stack region
// ---------------------------------------------------------------------------

/// Bounds of a caller-owned stack buffer. The kernel references the
/// memory for the task's lifetime but never frees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    pub start: *mut usize,
    pub words: usize,
}

impl StackRegion {
    pub const EMPTY: StackRegion = StackRegion {
        start: core::ptr::null_mut(),
        words: 0,
    };

    pub fn from_slice(stack: &mut [usize]) -> Self {
        Self {
            start: stack.as_mut_ptr(),
            words: stack.len(),
        }
    }

    /// One past the highest word. Stacks grow down from here.
    #[inline]
    pub fn top(&self) -> *mut usize {
        self.start.wrapping_add(self.words)
    }

    #[inline]
    pub fn contains(&self, ptr: *const usize) -> bool {
        let p = ptr as usize;
        p >= self.start as usize && p <= self.top() as usize
    }
}

// ---------------------------------------------------------------------------
// Runnable capability
// ---------------------------------------------------------------------------

/// Something a task executes. `run` never returns: a task lives until
/// reset, there is no way to terminate it.
///
/// The receiver is `'static` and shared, so implementors must be `Sync`.
pub trait Runnable: Sync {
    fn run(&self, arg: usize) -> !;
}

/// Adapter turning a plain function into a `Runnable`.
///
/// ```ignore
/// fn blink(period: usize) -> ! { loop { kernel::delay(period as u32) } }
/// static BLINK: FnTask = FnTask(blink);
/// kernel::create_task(&BLINK, 500, stack, "blink", 2)?;
/// ```
pub struct FnTask(pub fn(usize) -> !);

impl Runnable for FnTask {
    fn run(&self, arg: usize) -> ! {
        (self.0)(arg)
    }
}

/// First code executed by every task. The synthetic initial frame places
/// the runnable in the first argument register and `arg` in the second.
///
/// # Safety
/// `runnable` must point to a live `R` for the rest of the program.
unsafe extern "C" fn task_trampoline<R: Runnable>(runnable: *const (), arg: usize) -> ! {
    let runnable = &*(runnable as *const R);
    runnable.run(arg)
}

/// Build the architecture-neutral entry description for `runnable(arg)`.
pub fn entry_for<R: Runnable>(runnable: &'static R, arg: usize) -> TaskEntry {
    TaskEntry {
        trampoline: task_trampoline::<R>,
        runnable: runnable as *const R as *const (),
        arg,
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB): per-task scheduling record.
///
/// `C` is the architecture's saved-context type (the stack cursor). It is
/// only meaningful while the task is not running; the running task's live
/// stack pointer is in the processor.
#[derive(Debug, Clone, Copy)]
pub struct TaskControlBlock<C: Copy> {
    /// Saved execution-stack cursor, written by the context switch.
    pub context: C,

    /// Caller-owned stack buffer.
    pub stack: StackRegion,

    pub name: TaskName,

    pub state: TaskState,

    /// Higher value = more eligible.
    pub priority: u32,

    /// Tick countdown, meaningful only while `Blocked`.
    pub delay_remaining: u32,

    /// Whether this slot holds a created task.
    pub active: bool,
}

impl<C: Copy> TaskControlBlock<C> {
    /// An unallocated slot. Used to fill the registry arena.
    pub const fn empty(context: C) -> Self {
        Self {
            context,
            stack: StackRegion::EMPTY,
            name: TaskName::EMPTY,
            state: TaskState::Suspended,
            priority: 0,
            delay_remaining: 0,
            active: false,
        }
    }

    /// Populate a slot for a freshly created task. The context must
    /// already hold the synthetic initial frame.
    pub fn init(&mut self, context: C, stack: StackRegion, name: &str, priority: u32) {
        self.context = context;
        self.stack = stack;
        self.name = TaskName::new(name);
        self.state = TaskState::Ready;
        self.priority = priority;
        self.delay_remaining = 0;
        self.active = true;
    }

    #[inline]
    pub fn is_eligible(&self) -> bool {
        self.active && self.state.is_eligible()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcb_initialization() {
        let mut tcb = TaskControlBlock::empty(0usize);
        assert!(!tcb.active);
        assert_eq!(tcb.state, TaskState::Suspended);
        assert!(!tcb.is_eligible());

        let mut stack = [0usize; 64];
        let region = StackRegion::from_slice(&mut stack);
        tcb.init(42, region, "worker", 5);

        assert!(tcb.active);
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.context, 42);
        assert_eq!(tcb.priority, 5);
        assert_eq!(tcb.delay_remaining, 0);
        assert_eq!(tcb.name.as_str(), "worker");
        assert_eq!(tcb.stack.words, 64);
        assert!(tcb.is_eligible());
    }

    #[test]
    fn test_blocked_and_suspended_are_not_eligible() {
        assert!(TaskState::Ready.is_eligible());
        assert!(TaskState::Running.is_eligible());
        assert!(!TaskState::Blocked.is_eligible());
        assert!(!TaskState::Suspended.is_eligible());
    }

    #[test]
    fn test_name_truncation() {
        let name = TaskName::new("a-very-long-task-name");
        assert_eq!(name.as_str(), "a-very-long-tas");
        assert_eq!(name.as_str().len(), TASK_NAME_LEN - 1);

        assert_eq!(TaskName::new("").as_str(), "");
        assert_eq!(TaskName::EMPTY.as_str(), "");
    }

    #[test]
    fn test_name_truncation_respects_char_boundary() {
        // 14 ASCII bytes followed by a 2-byte character straddling the cut
        let name = TaskName::new("abcdefghijklmné");
        assert_eq!(name.as_str(), "abcdefghijklmn");
    }

    #[test]
    fn test_stack_region_bounds() {
        let mut stack = [0usize; 32];
        let region = StackRegion::from_slice(&mut stack);
        assert_eq!(
            region.top() as usize - region.start as usize,
            32 * core::mem::size_of::<usize>()
        );
        assert!(region.contains(region.start));
        assert!(region.contains(region.top()));
        assert!(!region.contains(region.top().wrapping_add(1)));
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(std::format!("{}", TaskId(3)), "#3");
        assert_eq!(std::format!("{}", TaskId::IDLE), "idle");
        assert!(TaskId::IDLE.is_idle());
    }
}
