//! # TickOS: Tick-driven Operating System
//!
//! A preemptive, priority-based multitasking kernel for single-core
//! microcontrollers with a fixed task population and no heap.
//!
//! ## Overview
//!
//! Tasks are independent `Runnable`s, each on its own statically allocated
//! stack. A periodic hardware tick drives the kernel: it ages delayed tasks,
//! picks the highest-priority eligible task and switches to it if it is not
//! the one already running. A task can also give up the processor for a
//! number of ticks with `delay`.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │     init() · create_task() · start() · delay() · tick() │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │  Registry / Ready  │  Sync Primitives  │
//! │  scheduler.rs│  registry.rs       │  sync.rs          │
//! │  ─ select()  │  ready_list.rs     │  ─ CriticalSection│
//! │  ─ tick()    │  stack.rs          │                   │
//! │  ─ delay()   │                    │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │              Task Model (task.rs)                       │
//! │    TCB · TaskState · Runnable · StackRegion            │
//! ├────────────────────────────────────────────────────────┤
//! │     Arch trait (arch/mod.rs) · TaskFrame               │
//! │     cortex_m4.rs: PendSV · SysTick · PRIMASK           │
//! │     sim.rs: host simulator                             │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Policy
//!
//! Strict priority: a task replaces the current candidate only with a
//! strictly greater priority. New tasks are linked at the head of the ready
//! list, so among equal priorities the most recently created task wins.
//! When nothing is eligible, the idle task runs and waits for the next
//! interrupt.
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **Fixed-size TCB arena**: `MAX_TASKS` user slots plus a reserved idle slot
//! - **Caller-owned stacks**: `&'static mut [usize]`, painted with a guard pattern
//! - **Critical sections**: every kernel-state mutation runs with interrupts
//!   suppressed, nesting through the `Arch` token

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod task;
pub mod stack;
pub mod ready_list;
pub mod registry;
pub mod scheduler;
pub mod arch;
pub mod sync;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;

pub use error::KernelError;
pub use scheduler::Scheduler;
pub use task::{FnTask, Runnable, TaskId, TaskState};
