//! # TickOS Example Firmware
//!
//! Three periodic tasks sharing one Cortex-M4:
//!
//! | Task | Priority | Period (ticks) | Behavior |
//! |------|----------|----------------|----------|
//! | `control` | 3 | 5 | Short control-loop step, then sleeps |
//! | `sensor` | 3 | 10 | Samples, then sleeps |
//! | `housekeeping` | 1 | 100 | Background bookkeeping |
//!
//! `control` and `sensor` share a priority; `sensor` is created later, so it
//! wins whenever both are Ready in the same tick. While every task sleeps,
//! the idle task waits for the next interrupt.
//!
//! On a host target the same task set runs on the simulator and the
//! kernel's log output goes to stderr through `env_logger` (`RUST_LOG`
//! narrows it).

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

/// Ticks between activations, indexed by creation order.
const PERIODS: [u32; 3] = [5, 10, 100];

const PRIORITIES: [u32; 3] = [3, 3, 1];

const NAMES: [&str; 3] = ["control", "sensor", "housekeeping"];

// ---------------------------------------------------------------------------
// Device firmware
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod firmware {
    use cortex_m_rt::entry;
    use panic_halt as _;

    use tickos::config::DEFAULT_STACK_WORDS;
    use tickos::kernel;
    use tickos::FnTask;

    use super::{NAMES, PERIODS, PRIORITIES};

    /// **Periodic task**: do a burst of work, then sleep for `period` ticks.
    fn periodic(period: usize) -> ! {
        loop {
            let mut work: u32 = 0;
            for _ in 0..1000 {
                work = work.wrapping_add(1);
            }
            kernel::delay(period as u32);
        }
    }

    static PERIODIC: FnTask = FnTask(periodic);

    /// Firmware entry point. Initializes the kernel, creates tasks, and
    /// starts the scheduler. Does not return.
    #[entry]
    fn main() -> ! {
        let cp = cortex_m::Peripherals::take().unwrap();

        kernel::init().expect("kernel initialized twice");

        let stacks = [
            cortex_m::singleton!(: [usize; DEFAULT_STACK_WORDS] = [0; DEFAULT_STACK_WORDS]),
            cortex_m::singleton!(: [usize; DEFAULT_STACK_WORDS] = [0; DEFAULT_STACK_WORDS]),
            cortex_m::singleton!(: [usize; DEFAULT_STACK_WORDS] = [0; DEFAULT_STACK_WORDS]),
        ];
        for (i, stack) in stacks.into_iter().enumerate() {
            let stack = stack.expect("stack taken once");
            kernel::create_task(&PERIODIC, PERIODS[i] as usize, stack, NAMES[i], PRIORITIES[i])
                .expect("failed to create task");
        }

        // Start the scheduler; does not return
        kernel::start(cp)
    }
}

// ---------------------------------------------------------------------------
// Host simulation
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "none"))]
fn main() {
    use log::LevelFilter;
    use tickos::arch::sim::Sim;
    use tickos::{FnTask, Scheduler};

    fn periodic(_: usize) -> ! {
        unreachable!("the simulator never branches into task code")
    }

    static PERIODIC: FnTask = FnTask(periodic);

    // Trace by default, `RUST_LOG` overrides
    env_logger::Builder::new()
        .filter_level(LevelFilter::Trace)
        .parse_default_env()
        .init();

    let sim: &'static Sim = Box::leak(Box::new(Sim::new()));
    let mut sched = Scheduler::new(sim);
    let leak_stack = |words: usize| -> &'static mut [usize] { Box::leak(vec![0; words].into_boxed_slice()) };

    if let Err(e) = sched.init(leak_stack(tickos::config::IDLE_STACK_WORDS)) {
        eprintln!("init failed: {}", e);
        return;
    }
    let mut ids = Vec::new();
    for i in 0..PERIODS.len() {
        match sched.create_task(&PERIODIC, PERIODS[i] as usize, leak_stack(256), NAMES[i], PRIORITIES[i]) {
            Ok(id) => ids.push(id),
            Err(e) => {
                eprintln!("cannot create {}: {}", NAMES[i], e);
                return;
            }
        }
    }

    match sched.launch() {
        // Safety: the context was just built by init_stack
        Ok(first) => unsafe { sim.resume_first(first) },
        Err(e) => {
            eprintln!("launch failed: {}", e);
            return;
        }
    }

    // Whenever a user task is on the processor it finishes its burst and
    // sleeps for its period, as the firmware task body does.
    for _ in 0..30 {
        if let Some(pos) = sched.current().and_then(|cur| ids.iter().position(|&id| id == cur)) {
            sched.delay(PERIODS[pos]);
        }
        if let Err(e) = sched.tick() {
            eprintln!("fatal: {}", e);
            return;
        }
    }

    println!(
        "{} ticks, {} context switches, running {:?}",
        sched.tick_count(),
        sim.switch_count(),
        sched.current()
    );
}
