//! # Kernel Errors
//!
//! Every fallible kernel operation returns `Result<_, KernelError>`.
//! Failures never leave the registry half-updated: a rejected creation
//! consumes no slot and touches no existing task.

use core::fmt;

use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Every user slot of the registry is already taken.
    CapacityExhausted,
    /// The supplied stack buffer cannot hold a frame plus the guard band.
    StackTooSmall { words: usize, min: usize },
    /// The guard band of `task`'s stack has been overwritten.
    StackOverflow { task: TaskId },
    /// The idle task has not been installed yet.
    NotInitialized,
    /// The scheduler has already been initialized or launched.
    AlreadyStarted,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::CapacityExhausted => write!(f, "task registry is full"),
            KernelError::StackTooSmall { words, min } => {
                write!(f, "stack of {} words is below the minimum of {}", words, min)
            }
            KernelError::StackOverflow { task } => write!(f, "stack overflow in task {}", task),
            KernelError::NotInitialized => write!(f, "idle task not installed"),
            KernelError::AlreadyStarted => write!(f, "scheduler already started"),
        }
    }
}
