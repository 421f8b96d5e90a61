//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements context switching via PendSV, SysTick timer configuration,
//! PRIMASK critical sections and system reset.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by `main` and interrupt handlers
//! - **PSP** (Process Stack Pointer): used by tasks in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler saves and restores
//! R4–R11, which completes the `TaskFrame`.
//!
//! `switch` only records the two context slots and pends PendSV. PendSV is
//! masked while PRIMASK is set, so the transfer happens at the instant the
//! outermost critical section exits: the outgoing task has already restored
//! its own interrupt state, and the incoming one resumes with the state it
//! was suspended with. At most one switch is pending at a time, since
//! nothing runs between the pend and PendSV except the rest of that
//! critical section.
//!
//! ## Interrupt Priorities
//!
//! SysTick and PendSV both sit at the lowest priority, so PendSV tail-chains
//! after the tick handler and never preempts another ISR.

use core::arch::{asm, naked_asm};
use core::ptr;

use cortex_m::interrupt;
use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m::register::primask::{self, Primask};

use super::{push_frame, Arch, TaskEntry, TaskFrame};
use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

/// Context slot PendSV stores the outgoing PSP into.
static mut SWITCH_FROM: *mut *mut usize = ptr::null_mut();

/// Context slot PendSV loads the incoming PSP from.
static mut SWITCH_TO: *const *mut usize = ptr::null();

/// The Cortex-M4 processor. Stateless; all state is in core registers.
pub struct CortexM4;

impl CortexM4 {
    pub const fn new() -> Self {
        CortexM4
    }
}

impl Default for CortexM4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Arch for CortexM4 {
    type Context = *mut usize;
    type IrqState = Primask;

    const NULL_CONTEXT: *mut usize = ptr::null_mut();

    #[inline]
    fn enter_critical(&self) -> Primask {
        let state = primask::read();
        interrupt::disable();
        state
    }

    #[inline]
    fn exit_critical(&self, state: Primask) {
        if state.is_active() {
            // Safety: interrupts were enabled when the matching enter ran
            unsafe { interrupt::enable() };
        }
    }

    unsafe fn init_stack(&self, top: *mut usize, entry: &TaskEntry) -> *mut usize {
        push_frame(top, TaskFrame::initial(entry, task_exit as usize))
    }

    unsafe fn switch(&self, save_into: *mut *mut usize, load_from: *const *mut usize) {
        ptr::addr_of_mut!(SWITCH_FROM).write_volatile(save_into);
        ptr::addr_of_mut!(SWITCH_TO).write_volatile(load_from);
        SCB::set_pendsv();
    }

    unsafe fn start_first(&self, context: *const *mut usize) -> ! {
        start_first_task(*context)
    }

    #[inline]
    fn wait_for_interrupt() {
        cortex_m::asm::wfi();
    }

    fn system_reset(&self) -> ! {
        SCB::sys_reset()
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the processor clock.
/// Each tick runs `SysTick`, which calls `kernel::tick()`.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Set PendSV and SysTick to the lowest interrupt priority.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // Safety: lowering kernel handler priorities cannot break a
    // priority-based critical section, none are used
    unsafe {
        scb.set_priority(SystemHandler::PendSV, 0xFF);
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Start the first task by switching to PSP and branching to Thread mode.
///
/// Unwinds the synthetic `TaskFrame` by hand, since there is no exception
/// to return from yet, and enables interrupts right before the branch.
///
/// # Safety
/// Must only be called once, with interrupts disabled and a context built
/// by `init_stack`.
unsafe fn start_first_task(psp: *mut usize) -> ! {
    asm!(
        // Skip the callee-saved block (R4-R11), all zero in a fresh frame
        "adds r0, #32",
        "msr psp, r0",

        // Thread mode uses PSP (CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",

        // Pop the exception frame manually
        "pop {{r0-r3, r12}}",  // R0 = runnable, R1 = arg
        "pop {{r4}}",          // LR (task_exit)
        "pop {{r5}}",          // PC (trampoline)
        "pop {{r6}}",          // xPSR (discarded)

        "mov lr, r4",
        "orr r5, r5, #1",      // BX needs the Thumb bit
        "cpsie i",
        "bx r5",

        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler. Performs the pended context switch.
///
/// ## Sequence
/// 1. Push R4–R11 onto the outgoing task's stack (PSP)
/// 2. Store the resulting PSP through `SWITCH_FROM`
/// 3. Load the incoming PSP through `SWITCH_TO`
/// 4. Pop R4–R11 from the incoming stack and set PSP
/// 5. Return from exception (hardware restores R0–R3, R12, LR, PC, xPSR)
///
/// # Safety
/// Entered only by the NVIC, after `CortexM4::switch` set both slots.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",

        // --- Save outgoing context ---
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "ldr r1, ={from}",
        "ldr r1, [r1]",
        "str r0, [r1]",

        // --- Restore incoming context ---
        "ldr r1, ={to}",
        "ldr r1, [r1]",
        "ldr r0, [r1]",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",

        "cpsie i",
        // Return to Thread mode on PSP (EXC_RETURN = 0xFFFFFFFD)
        "ldr r0, =0xFFFFFFFD",
        "bx r0",

        from = sym SWITCH_FROM,
        to = sym SWITCH_TO,
    );
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler, the scheduler tick entry point.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    crate::kernel::tick();
}

/// Fallback return address for a task entry. Unreachable, since
/// `Runnable::run` never returns.
extern "C" fn task_exit() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}
