//! # Kernel
//!
//! The device-side kernel instance and the task-facing API for TickOS.
//!
//! One `Scheduler` lives in a static for the whole power-on-to-reset
//! lifetime. Every entry point reaches it only inside a critical section,
//! so the SysTick handler and tasks never observe each other's partial
//! updates.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← Install the idle task
//!         ├─► kernel::create_task() ← Register tasks (×N)
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Set interrupt priorities
//!               ├─► Configure SysTick
//!               └─► Start first task via Arch::start_first()
//! ```

use log::error;

use crate::arch::cortex_m4::{self, CortexM4};
use crate::arch::Arch;
use crate::config::IDLE_STACK_WORDS;
use crate::error::KernelError;
use crate::scheduler::Scheduler;
use crate::sync;
use crate::task::{Runnable, TaskId};

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

static ARCH: CortexM4 = CortexM4::new();

/// The kernel instance.
///
/// # Safety
/// Only dereferenced through `scheduler()` inside a critical section, or
/// from the SysTick handler, which never nests with itself.
static mut SCHEDULER: Scheduler<'static, CortexM4> = Scheduler::new(&ARCH);

#[inline]
fn scheduler() -> *mut Scheduler<'static, CortexM4> {
    core::ptr::addr_of_mut!(SCHEDULER)
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel: install the idle task.
///
/// # Errors
/// `AlreadyStarted` on a second call.
pub fn init() -> Result<(), KernelError> {
    let idle_stack = cortex_m::singleton!(: [usize; IDLE_STACK_WORDS] = [0; IDLE_STACK_WORDS])
        .ok_or(KernelError::AlreadyStarted)?;
    sync::critical_section(&ARCH, |_cs| unsafe { (*scheduler()).init(idle_stack) })
}

/// Create a task running `runnable.run(arg)` on `stack`.
///
/// # Example
/// ```ignore
/// static BLINK: FnTask = FnTask(blink);
/// let stack = cortex_m::singleton!(: [usize; 512] = [0; 512]).unwrap();
/// kernel::create_task(&BLINK, 250, stack, "blink", 2)?;
/// ```
pub fn create_task<R: Runnable>(
    runnable: &'static R,
    arg: usize,
    stack: &'static mut [usize],
    name: &str,
    priority: u32,
) -> Result<TaskId, KernelError> {
    sync::critical_section(&ARCH, |_cs| unsafe {
        (*scheduler()).create_task(runnable, arg, stack, name, priority)
    })
}

/// Start the scheduler. **Does not return.**
///
/// Sets PendSV/SysTick priorities, configures the SysTick timer and
/// launches the first task with interrupts enabled. A launch failure
/// (no `init()`) resets the system.
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    // Re-enabled by the first task's bootstrap
    cortex_m::interrupt::disable();

    cortex_m4::set_interrupt_priorities(&mut core_peripherals.SCB);
    cortex_m4::configure_systick(&mut core_peripherals.SYST);

    // Only the context pointer leaves the section; the scheduler borrow
    // ends here, before SysTick can reach it again
    let first = sync::critical_section(&ARCH, |_cs| unsafe { (*scheduler()).launch() });

    match first {
        // Safety: first and only bootstrap, the context was built by init_stack
        Ok(context) => unsafe { ARCH.start_first(context) },
        Err(e) => {
            error!("cannot start scheduler: {}", e);
            ARCH.system_reset()
        }
    }
}

/// Block the calling task for `ticks` ticks. `delay(0)` yields.
pub fn delay(ticks: u32) {
    sync::critical_section(&ARCH, |_cs| unsafe { (*scheduler()).delay(ticks) });
}

/// Let a higher-priority Ready task run, if there is one.
pub fn yield_now() {
    sync::critical_section(&ARCH, |_cs| unsafe { (*scheduler()).yield_now() });
}

/// Ticks elapsed since the SysTick timer was started.
pub fn tick_count() -> u64 {
    sync::critical_section(&ARCH, |_cs| unsafe { (*scheduler()).tick_count() })
}

/// The task executing right now.
pub fn current_task() -> Option<TaskId> {
    sync::critical_section(&ARCH, |_cs| unsafe { (*scheduler()).current() })
}

/// Tick Manager entry, called by the SysTick handler.
///
/// A failed stack guard check is unrecoverable: log it and reset.
pub fn tick() {
    if let Err(e) = unsafe { (*scheduler()).tick() } {
        error!("fatal: {}", e);
        ARCH.system_reset();
    }
}
