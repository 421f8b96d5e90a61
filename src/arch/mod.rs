//! # Architecture Abstraction Layer
//!
//! The `Arch` trait is the whole contract between the portable kernel and
//! the processor: context save/restore, first-task bootstrap, critical
//! sections, initial stack frames and the idle wait. The scheduler never
//! touches registers or raw frame words itself.
//!
//! Ports:
//! - `cortex_m4`: bare-metal ARMv7E-M (PendSV switch, PRIMASK, SysTick)
//! - `sim`: host simulator running the same protocol on real memory

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

#[cfg(not(target_os = "none"))]
pub mod sim;

use core::mem::size_of;

// ---------------------------------------------------------------------------
// Port contract
// ---------------------------------------------------------------------------

pub trait Arch {
    /// Saved execution state of a suspended task (its stack cursor).
    type Context: Copy;

    /// Opaque interrupt state returned by `enter_critical`.
    type IrqState: Copy;

    /// Context value of a slot that has never been initialized.
    const NULL_CONTEXT: Self::Context;

    /// Suppress interrupts and return the previous interrupt state.
    fn enter_critical(&self) -> Self::IrqState;

    /// Restore exactly the state returned by the matching `enter_critical`.
    fn exit_critical(&self, state: Self::IrqState);

    /// Build the synthetic frame below `top` so that a later `switch` or
    /// `start_first` into the returned context begins executing `entry`.
    ///
    /// # Safety
    /// `top` must point one past a caller-owned buffer of at least
    /// `FRAME_WORDS` words plus alignment slack.
    unsafe fn init_stack(&self, top: *mut usize, entry: &TaskEntry) -> Self::Context;

    /// Capture the running task's state into `save_into` and resume the
    /// task whose state is in `load_from`.
    ///
    /// A port may defer the transfer until the caller's critical section is
    /// exited; it must not be deferred past that point.
    ///
    /// # Safety
    /// Both pointers must address initialized contexts that stay valid
    /// until the switch has taken place.
    unsafe fn switch(&self, save_into: *mut Self::Context, load_from: *const Self::Context);

    /// Begin executing `context` with no outgoing task. Never returns.
    ///
    /// # Safety
    /// Must be called once, before any `switch`.
    unsafe fn start_first(&self, context: *const Self::Context) -> !;

    /// Low-power wait, woken by the next interrupt. Used by the idle task.
    fn wait_for_interrupt();

    /// Full system reset. The recovery path for fatal kernel faults.
    fn system_reset(&self) -> !;
}

// ---------------------------------------------------------------------------
// Task entry
// ---------------------------------------------------------------------------

/// What a task's first resumption must call: `trampoline(runnable, arg)`.
#[derive(Debug, Clone, Copy)]
pub struct TaskEntry {
    pub trampoline: unsafe extern "C" fn(*const (), usize) -> !,
    pub runnable: *const (),
    pub arg: usize,
}

// ---------------------------------------------------------------------------
// Saved frame
// ---------------------------------------------------------------------------

/// Required alignment of a task stack top, in bytes (AAPCS).
pub const STACK_ALIGN: usize = 8;

/// xPSR with only the Thumb bit set.
pub const INITIAL_XPSR: usize = 0x0100_0000;

/// Registers the processor stacks on exception entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExceptionFrame {
    pub r0: usize,
    pub r1: usize,
    pub r2: usize,
    pub r3: usize,
    pub r12: usize,
    pub lr: usize,
    pub pc: usize,
    pub xpsr: usize,
}

/// Full saved state of a suspended task, lowest address first.
///
/// ```text
/// high  ┌────────────────────┐ ◄── aligned stack top
///       │ xPSR, PC, LR, R12  │
///       │ R3, R2, R1, R0     │  exception frame
///       ├────────────────────┤
///       │ R11 … R4           │  callee-saved
/// low   └────────────────────┘ ◄── saved context
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskFrame {
    pub r4_r11: [usize; 8],
    pub exception: ExceptionFrame,
}

/// Size of a `TaskFrame` in machine words.
pub const FRAME_WORDS: usize = size_of::<TaskFrame>() / size_of::<usize>();

impl TaskFrame {
    pub const ZERO: TaskFrame = TaskFrame {
        r4_r11: [0; 8],
        exception: ExceptionFrame {
            r0: 0,
            r1: 0,
            r2: 0,
            r3: 0,
            r12: 0,
            lr: 0,
            pc: 0,
            xpsr: 0,
        },
    };

    /// The frame a task appears to have been preempted with at its own
    /// entry point: argument registers loaded, PC at the trampoline.
    pub fn initial(entry: &TaskEntry, exit: usize) -> Self {
        Self {
            r4_r11: [0; 8],
            exception: ExceptionFrame {
                r0: entry.runnable as usize,
                r1: entry.arg,
                r2: 0,
                r3: 0,
                r12: 0,
                lr: exit,
                // Exception return expects a halfword-aligned PC
                pc: entry.trampoline as usize & !1,
                xpsr: INITIAL_XPSR,
            },
        }
    }
}

/// Align `top` down and store `frame` immediately below it. Returns the
/// new stack cursor.
///
/// # Safety
/// The `FRAME_WORDS` words below the aligned top must be writable.
pub unsafe fn push_frame(top: *mut usize, frame: TaskFrame) -> *mut usize {
    let aligned = (top as usize) & !(STACK_ALIGN - 1);
    let sp = (aligned as *mut usize).sub(FRAME_WORDS);
    core::ptr::write(sp as *mut TaskFrame, frame);
    sp
}

/// Load the frame stored at `sp` and return it with the cursor just above.
///
/// # Safety
/// `sp` must point at a frame written by `push_frame`.
pub unsafe fn pop_frame(sp: *const usize) -> (TaskFrame, *mut usize) {
    let frame = core::ptr::read(sp as *const TaskFrame);
    (frame, sp.add(FRAME_WORDS) as *mut usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn never(_: *const (), _: usize) -> ! {
        panic!("not executed");
    }

    #[test]
    fn test_frame_is_sixteen_registers() {
        assert_eq!(FRAME_WORDS, 16);
    }

    #[test]
    fn test_initial_frame_layout() {
        let entry = TaskEntry {
            trampoline: never,
            runnable: 0x1000 as *const (),
            arg: 7,
        };
        let frame = TaskFrame::initial(&entry, 0x2001);
        assert_eq!(frame.exception.r0, 0x1000);
        assert_eq!(frame.exception.r1, 7);
        assert_eq!(frame.exception.lr, 0x2001);
        assert_eq!(frame.exception.pc, never as usize & !1);
        assert_eq!(frame.exception.xpsr, INITIAL_XPSR);
        assert_eq!(frame.r4_r11, [0; 8]);
    }

    #[test]
    fn test_push_and_pop_frame() {
        let mut stack = [0usize; 40];
        let top = unsafe { stack.as_mut_ptr().add(stack.len()) };
        let mut frame = TaskFrame::default();
        frame.r4_r11[3] = 0xAB;
        frame.exception.pc = 0x4000;

        let sp = unsafe { push_frame(top, frame) };
        assert_eq!(sp as usize % STACK_ALIGN, 0);
        assert!(sp as usize >= stack.as_ptr() as usize);
        assert!((top as usize) - (sp as usize) < (FRAME_WORDS + 2) * size_of::<usize>());

        let (loaded, above) = unsafe { pop_frame(sp) };
        assert_eq!(loaded, frame);
        assert_eq!(above as usize, sp as usize + FRAME_WORDS * size_of::<usize>());
    }
}
