//! # TickOS Configuration
//!
//! Compile-time constants governing the kernel. All limits are fixed at
//! build time. There is no dynamic allocation and nothing is negotiated
//! at runtime.

/// Maximum number of user tasks the registry can hold.
/// The idle task lives in a reserved slot on top of this count.
pub const MAX_TASKS: usize = 8;

/// Total number of TCB slots, including the reserved idle slot.
pub const TASK_SLOTS: usize = MAX_TASKS + 1;

/// Scheduler tick frequency in Hz. One tick is one unit of logical time
/// for `delay()`.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Stack size of the idle task, in machine words.
pub const IDLE_STACK_WORDS: usize = 256;

/// Suggested stack size for application tasks, in machine words.
pub const DEFAULT_STACK_WORDS: usize = 1024;

/// Smallest stack `create_task` accepts, in machine words. Must hold the
/// guard band, one full saved frame and some room for the task to run.
pub const MIN_STACK_WORDS: usize = 64;

/// Capacity of a task name buffer. Names are truncated to
/// `TASK_NAME_LEN - 1` bytes.
pub const TASK_NAME_LEN: usize = 16;

/// Pattern painted over every task stack at creation. A guard word that
/// no longer holds it means the task has written past its stack.
pub const STACK_GUARD_PATTERN: usize = 0xDEAD_BEEF;

/// Number of words at the low end of each stack that form the guard band.
pub const STACK_GUARD_WORDS: usize = 4;

/// Ticks between automatic stack guard checks from the tick path.
/// `0` disables the automatic check.
pub const STACK_CHECK_INTERVAL: u32 = 100;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::FRAME_WORDS;
    use static_assertions::const_assert;

    const_assert!(MAX_TASKS > 0);
    const_assert!(TASK_NAME_LEN > 1);
    const_assert!(MIN_STACK_WORDS >= STACK_GUARD_WORDS + FRAME_WORDS);
    const_assert!(IDLE_STACK_WORDS >= MIN_STACK_WORDS);
    const_assert!(DEFAULT_STACK_WORDS >= MIN_STACK_WORDS);

    #[test]
    fn test_tick_reload_fits_systick() {
        // SysTick has a 24-bit reload register
        let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
        assert!(reload > 0);
        assert!(reload <= 0x00FF_FFFF);
    }
}
