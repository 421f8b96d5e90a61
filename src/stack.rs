//! # Stack Guard
//!
//! Every task stack is painted with `STACK_GUARD_PATTERN` at creation.
//! Stacks grow down, so the lowest `STACK_GUARD_WORDS` words are the last
//! ones a task reaches; once any of them is overwritten the task has run
//! past its buffer.
//!
//! Detection only: nothing traps the overflow. The scheduler invokes
//! `guard_intact` from the tick path every `STACK_CHECK_INTERVAL` ticks.

use crate::config::{STACK_GUARD_PATTERN, STACK_GUARD_WORDS};
use crate::task::StackRegion;

/// Fill the whole buffer with the guard pattern.
pub fn paint(stack: &mut [usize]) {
    stack.fill(STACK_GUARD_PATTERN);
}

/// Whether the guard band at the bottom of `region` is untouched.
///
/// # Safety
/// `region` must describe a live stack buffer.
pub unsafe fn guard_intact(region: &StackRegion) -> bool {
    let guard = STACK_GUARD_WORDS.min(region.words);
    (0..guard).all(|i| core::ptr::read_volatile(region.start.add(i)) == STACK_GUARD_PATTERN)
}

/// Number of words, counted from the bottom, that still hold the paint.
/// A lower bound on how much headroom the task has never used.
///
/// # Safety
/// `region` must describe a live stack buffer.
pub unsafe fn unused_words(region: &StackRegion) -> usize {
    (0..region.words)
        .take_while(|&i| core::ptr::read_volatile(region.start.add(i)) == STACK_GUARD_PATTERN)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_painted_stack_is_intact() {
        let mut stack = [0usize; 32];
        paint(&mut stack);
        let region = StackRegion::from_slice(&mut stack);
        assert!(unsafe { guard_intact(&region) });
        assert_eq!(unsafe { unused_words(&region) }, 32);
    }

    #[test]
    fn test_usage_from_the_top_keeps_guard() {
        let mut stack = [0usize; 32];
        paint(&mut stack);
        for word in stack[20..].iter_mut() {
            *word = 0;
        }
        let region = StackRegion::from_slice(&mut stack);
        assert!(unsafe { guard_intact(&region) });
        assert_eq!(unsafe { unused_words(&region) }, 20);
    }

    #[test]
    fn test_overwritten_guard_is_detected() {
        let mut stack = [0usize; 32];
        paint(&mut stack);
        stack[STACK_GUARD_WORDS - 1] = 0x1234;
        let region = StackRegion::from_slice(&mut stack);
        assert!(!unsafe { guard_intact(&region) });
        assert_eq!(unsafe { unused_words(&region) }, STACK_GUARD_WORDS - 1);
    }
}
