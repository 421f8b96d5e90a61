//! # Host Simulator Port
//!
//! Runs the context-switch protocol on the host without executing task
//! code. The simulated processor owns one live register file and stack
//! pointer; `switch` really stores the outgoing `TaskFrame` on the outgoing
//! task's stack and really loads the incoming one from memory, exactly
//! like the Cortex-M4 port does. Tests drive it by mutating the live
//! registers in place of the running task.

use core::cell::Cell;

use super::{pop_frame, push_frame, Arch, TaskEntry, TaskFrame};

/// Simulated single-core processor.
pub struct Sim {
    interrupts_enabled: Cell<bool>,
    critical_depth: Cell<usize>,
    registers: Cell<TaskFrame>,
    stack_pointer: Cell<*mut usize>,
    switches: Cell<usize>,
    started: Cell<bool>,
}

impl Sim {
    pub const fn new() -> Self {
        Self {
            interrupts_enabled: Cell::new(true),
            critical_depth: Cell::new(0),
            registers: Cell::new(TaskFrame::ZERO),
            stack_pointer: Cell::new(core::ptr::null_mut()),
            switches: Cell::new(0),
            started: Cell::new(false),
        }
    }

    /// The live register file of whatever task is "running".
    pub fn registers(&self) -> TaskFrame {
        self.registers.get()
    }

    /// Stand-in for the running task executing instructions.
    pub fn set_registers(&self, frame: TaskFrame) {
        self.registers.set(frame);
    }

    pub fn stack_pointer(&self) -> *mut usize {
        self.stack_pointer.get()
    }

    pub fn switch_count(&self) -> usize {
        self.switches.get()
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled.get()
    }

    pub fn critical_depth(&self) -> usize {
        self.critical_depth.get()
    }

    pub fn is_started(&self) -> bool {
        self.started.get()
    }

    /// The restore half of `start_first`: load `context` into the live
    /// registers. The host cannot branch into task code, so this is where
    /// simulation of the first task begins.
    ///
    /// # Safety
    /// `context` must hold a cursor produced by `init_stack` or `switch`.
    pub unsafe fn resume_first(&self, context: *const *mut usize) {
        let (frame, sp) = pop_frame(*context);
        self.registers.set(frame);
        self.stack_pointer.set(sp);
        self.started.set(true);
    }
}

impl Default for Sim {
    fn default() -> Self {
        Self::new()
    }
}

extern "C" fn task_exit() -> ! {
    panic!("simulated task returned from its entry point");
}

impl Arch for Sim {
    type Context = *mut usize;
    type IrqState = bool;

    const NULL_CONTEXT: *mut usize = core::ptr::null_mut();

    fn enter_critical(&self) -> bool {
        let previous = self.interrupts_enabled.replace(false);
        self.critical_depth.set(self.critical_depth.get() + 1);
        previous
    }

    fn exit_critical(&self, state: bool) {
        self.critical_depth.set(self.critical_depth.get().saturating_sub(1));
        self.interrupts_enabled.set(state);
    }

    unsafe fn init_stack(&self, top: *mut usize, entry: &TaskEntry) -> *mut usize {
        push_frame(top, TaskFrame::initial(entry, task_exit as usize))
    }

    unsafe fn switch(&self, save_into: *mut *mut usize, load_from: *const *mut usize) {
        debug_assert!(
            !self.interrupts_enabled.get(),
            "context switch outside a critical section"
        );
        *save_into = push_frame(self.stack_pointer.get(), self.registers.get());
        let (frame, sp) = pop_frame(*load_from);
        self.registers.set(frame);
        self.stack_pointer.set(sp);
        self.switches.set(self.switches.get() + 1);
    }

    unsafe fn start_first(&self, context: *const *mut usize) -> ! {
        self.resume_first(context);
        panic!("simulated processor cannot branch into task code");
    }

    fn wait_for_interrupt() {
        core::hint::spin_loop();
    }

    fn system_reset(&self) -> ! {
        panic!("system reset requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{FRAME_WORDS, INITIAL_XPSR};

    unsafe extern "C" fn entry_a(_: *const (), _: usize) -> ! {
        panic!("not executed");
    }

    unsafe extern "C" fn entry_b(_: *const (), _: usize) -> ! {
        panic!("not executed");
    }

    fn entry(trampoline: unsafe extern "C" fn(*const (), usize) -> !, arg: usize) -> TaskEntry {
        TaskEntry {
            trampoline,
            runnable: core::ptr::null(),
            arg,
        }
    }

    #[test]
    fn test_nested_critical_sections_restore_outer_state() {
        let sim = Sim::new();
        assert!(sim.interrupts_enabled());

        let outer = sim.enter_critical();
        let inner = sim.enter_critical();
        assert!(!sim.interrupts_enabled());
        assert_eq!(sim.critical_depth(), 2);

        sim.exit_critical(inner);
        assert!(!sim.interrupts_enabled());
        sim.exit_critical(outer);
        assert!(sim.interrupts_enabled());
        assert_eq!(sim.critical_depth(), 0);
    }

    #[test]
    fn test_init_stack_bootstraps_entry() {
        let sim = Sim::new();
        let mut stack = [0usize; 64];
        let top = unsafe { stack.as_mut_ptr().add(stack.len()) };
        let mut ctx = unsafe { sim.init_stack(top, &entry(entry_a, 9)) };

        unsafe { sim.resume_first(&mut ctx) };
        let regs = sim.registers();
        assert_eq!(regs.exception.pc, entry_a as usize & !1);
        assert_eq!(regs.exception.r1, 9);
        assert_eq!(regs.exception.xpsr, INITIAL_XPSR);
        assert_eq!(sim.stack_pointer(), unsafe { ctx.add(FRAME_WORDS) });
        assert!(sim.is_started());
    }

    #[test]
    fn test_switch_round_trip_preserves_registers() {
        let sim = Sim::new();
        let mut stack_a = [0usize; 64];
        let mut stack_b = [0usize; 64];
        let mut ctx_a = unsafe {
            sim.init_stack(stack_a.as_mut_ptr().add(stack_a.len()), &entry(entry_a, 1))
        };
        let mut ctx_b = unsafe {
            sim.init_stack(stack_b.as_mut_ptr().add(stack_b.len()), &entry(entry_b, 2))
        };

        unsafe { sim.resume_first(&mut ctx_a) };
        let mut working = sim.registers();
        working.r4_r11 = [11, 12, 13, 14, 15, 16, 17, 18];
        working.exception.r2 = 0xCAFE;
        working.exception.pc += 0x40;
        sim.set_registers(working);
        let sp_a = sim.stack_pointer();

        let token = sim.enter_critical();
        unsafe { sim.switch(&mut ctx_a, &ctx_b) };
        sim.exit_critical(token);
        assert_eq!(sim.registers().exception.pc, entry_b as usize & !1);
        assert_eq!(sim.registers().exception.r1, 2);

        sim.set_registers(TaskFrame::default());

        let token = sim.enter_critical();
        unsafe { sim.switch(&mut ctx_b, &ctx_a) };
        sim.exit_critical(token);
        assert_eq!(sim.registers(), working);
        assert_eq!(sim.stack_pointer(), sp_a);
        assert_eq!(sim.switch_count(), 2);
    }
}
