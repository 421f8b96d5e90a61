//! # Scheduler
//!
//! The single, explicitly owned kernel state: task registry, ready list,
//! current task and tick counter. Both sources of control transfer, the
//! tick interrupt and a task's voluntary delay, end in `reschedule`.
//!
//! ## Scheduling Algorithm
//!
//! At each tick:
//! 1. **Count**: increment the monotonic tick counter
//! 2. **Age delays**: every Blocked task's countdown drops by one; a task
//!    reaching zero becomes Ready in the same tick
//! 3. **Guard check** (every `STACK_CHECK_INTERVAL` ticks): verify every
//!    stack's guard band
//! 4. **Select**: highest priority Ready/Running task, ties to the most
//!    recently created; idle if none
//! 5. **Switch**: if the winner is not the current task, hand over through
//!    `Arch::switch`
//!
//! Every mutation happens inside a critical section.

use core::ptr;

use log::{debug, error, info, trace, warn};

use crate::arch::{Arch, TaskEntry};
use crate::config::{MIN_STACK_WORDS, STACK_CHECK_INTERVAL};
use crate::error::KernelError;
use crate::ready_list::ReadyList;
use crate::registry::TaskRegistry;
use crate::stack;
use crate::sync::CriticalSection;
use crate::task::{self, Runnable, StackRegion, TaskControlBlock, TaskId, TaskState};

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// Kernel state, alive from initialization to reset.
///
/// ## Design Notes
///
/// - TCBs live in a fixed arena addressed by `TaskId` (no heap)
/// - The ready list links every created user task; state decides
///   eligibility, blocking never unlinks
/// - The idle task sits in a reserved slot outside the ready list and is
///   chosen only when no user task is eligible
pub struct Scheduler<'a, A: Arch> {
    arch: &'a A,

    registry: TaskRegistry<A::Context>,

    ready: ReadyList,

    /// Task whose state is `Running`. `None` until launch.
    current: Option<TaskId>,

    /// Monotonic tick counter.
    tick_count: u64,
}

impl<'a, A: Arch> Scheduler<'a, A> {
    pub const fn new(arch: &'a A) -> Self {
        Self {
            arch,
            registry: TaskRegistry::new(A::NULL_CONTEXT),
            ready: ReadyList::new(),
            current: None,
            tick_count: 0,
        }
    }

    /// Run `f` with interrupts suppressed.
    fn locked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let arch = self.arch;
        let _cs = CriticalSection::enter(arch);
        f(self)
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Install the idle task in its reserved slot. Must precede `launch`.
    pub fn init(&mut self, idle_stack: &'static mut [usize]) -> Result<(), KernelError> {
        let entry = TaskEntry {
            trampoline: idle_entry::<A>,
            runnable: ptr::null(),
            arg: 0,
        };
        self.locked(|s| {
            if s.registry.has_idle() {
                return Err(KernelError::AlreadyStarted);
            }
            let (context, region) = s.prepare_stack(idle_stack, &entry)?;
            s.registry.install_idle(context, region)?;
            debug!("idle task installed ({} words)", region.words);
            Ok(())
        })
    }

    /// Create a task that will execute `runnable.run(arg)` on `stack`.
    ///
    /// The task starts Ready at the head of the ready list, so among equal
    /// priorities it wins over every task created before it. Creation does
    /// not preempt; the new task competes from the next decision point.
    ///
    /// # Errors
    /// - `CapacityExhausted` if `MAX_TASKS` user tasks already exist
    /// - `StackTooSmall` if `stack` is shorter than `MIN_STACK_WORDS`
    ///
    /// Either way no slot is consumed and no existing task is touched.
    pub fn create_task<R: Runnable>(
        &mut self,
        runnable: &'static R,
        arg: usize,
        stack: &'static mut [usize],
        name: &str,
        priority: u32,
    ) -> Result<TaskId, KernelError> {
        let entry = task::entry_for(runnable, arg);
        self.locked(|s| {
            if let Err(e) = s.registry.next_free() {
                warn!("cannot create task {:?}: {}", name, e);
                return Err(e);
            }
            let (context, region) = s.prepare_stack(stack, &entry)?;
            let id = s.registry.insert(context, region, name, priority)?;
            let linked = s.ready.push_front(id);
            debug_assert!(linked, "fresh task {} already linked", id);
            debug!("created task {} {:?} priority {}", id, name, priority);
            Ok(id)
        })
    }

    /// Validate, paint and frame a stack buffer.
    fn prepare_stack(
        &self,
        buffer: &'static mut [usize],
        entry: &TaskEntry,
    ) -> Result<(A::Context, StackRegion), KernelError> {
        if buffer.len() < MIN_STACK_WORDS {
            return Err(KernelError::StackTooSmall {
                words: buffer.len(),
                min: MIN_STACK_WORDS,
            });
        }
        stack::paint(buffer);
        let region = StackRegion::from_slice(buffer);
        // Safety: the buffer is 'static, exclusively ours and large enough
        let context = unsafe { self.arch.init_stack(region.top(), entry) };
        Ok((context, region))
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Pick the task that should run next. Pure.
    ///
    /// Scans the ready list from the head and replaces the candidate only
    /// on a strictly greater priority, so the first task met at the top
    /// priority, the most recently created one, wins. Returns idle when no
    /// user task is Ready or Running.
    pub fn select(&self) -> TaskId {
        let mut best: Option<(TaskId, u32)> = None;
        for id in self.ready.iter() {
            let tcb = self.registry.tcb(id);
            if !tcb.is_eligible() {
                continue;
            }
            match best {
                Some((_, priority)) if tcb.priority <= priority => {}
                _ => best = Some((id, tcb.priority)),
            }
        }
        best.map_or(TaskId::IDLE, |(id, _)| id)
    }

    // -----------------------------------------------------------------------
    // Start
    // -----------------------------------------------------------------------

    /// Choose the first task, mark it Running and return the context that
    /// `Arch::start_first` must load.
    ///
    /// The returned pointer stays valid for the life of the scheduler; no
    /// borrow of `self` needs to outlive this call.
    pub fn launch(&mut self) -> Result<*const A::Context, KernelError> {
        self.locked(|s| {
            if !s.registry.has_idle() {
                return Err(KernelError::NotInitialized);
            }
            if s.current.is_some() {
                return Err(KernelError::AlreadyStarted);
            }
            let first = s.select();
            s.registry.tcb_mut(first).state = TaskState::Running;
            s.current = Some(first);
            info!(
                "starting scheduler with {} task(s), first {}",
                s.registry.count(),
                first
            );
            Ok(s.registry.context_ptr(first) as *const A::Context)
        })
    }

    // -----------------------------------------------------------------------
    // Tick & delay
    // -----------------------------------------------------------------------

    /// Tick handler body. Called once per timer interrupt.
    ///
    /// Returns whether a context switch was issued, or `StackOverflow` if
    /// the periodic guard check failed (no switch is issued then).
    pub fn tick(&mut self) -> Result<bool, KernelError> {
        self.locked(|s| {
            s.tick_count += 1;
            s.age_delays();

            if STACK_CHECK_INTERVAL != 0 && s.tick_count % STACK_CHECK_INTERVAL as u64 == 0 {
                s.check_stacks()?;
            }

            Ok(s.reschedule())
        })
    }

    /// Count every Blocked task down by one tick; promote those reaching
    /// zero. Returns the number promoted.
    fn age_delays(&mut self) -> usize {
        let mut promoted = 0;
        for id in self.ready.iter() {
            let tcb = self.registry.tcb_mut(id);
            if tcb.state != TaskState::Blocked || tcb.delay_remaining == 0 {
                continue;
            }
            tcb.delay_remaining -= 1;
            if tcb.delay_remaining == 0 {
                tcb.state = TaskState::Ready;
                promoted += 1;
                trace!("task {} ready at tick {}", id, self.tick_count);
            }
        }
        promoted
    }

    /// Block the calling task for `ticks` ticks and switch away.
    ///
    /// Writing the countdown, blocking and issuing the switch form one
    /// critical section. `delay(0)` blocks nothing and behaves as
    /// `yield_now`. Ignored before launch and from the idle task.
    pub fn delay(&mut self, ticks: u32) {
        if ticks == 0 {
            self.yield_now();
            return;
        }
        self.locked(|s| {
            let Some(current) = s.current else {
                warn!("delay({}) before the scheduler started", ticks);
                return;
            };
            if current.is_idle() {
                return;
            }
            let tcb = s.registry.tcb_mut(current);
            tcb.delay_remaining = ticks;
            tcb.state = TaskState::Blocked;
            trace!("task {} blocked for {} ticks", current, ticks);
            s.reschedule();
        })
    }

    /// Offer the processor to any task that now outranks the caller.
    pub fn yield_now(&mut self) {
        self.locked(|s| {
            s.reschedule();
        });
    }

    // -----------------------------------------------------------------------
    // Context-switch orchestration
    // -----------------------------------------------------------------------

    /// Compare the current task with the scheduler's choice and hand over
    /// if they differ. Must run inside a critical section.
    fn reschedule(&mut self) -> bool {
        let Some(prev) = self.current else {
            return false;
        };
        let next = self.select();
        if next == prev {
            return false;
        }

        // A delaying task stays Blocked; a preempted one goes back to Ready
        let outgoing = self.registry.tcb_mut(prev);
        if outgoing.state == TaskState::Running {
            outgoing.state = TaskState::Ready;
        }
        self.registry.tcb_mut(next).state = TaskState::Running;
        self.current = Some(next);
        trace!("switch {} -> {} at tick {}", prev, next, self.tick_count);

        let save_into = self.registry.context_ptr(prev);
        let load_from = self.registry.context_ptr(next) as *const A::Context;
        // Safety: both slots are initialized and the arena never moves
        unsafe { self.arch.switch(save_into, load_from) };
        true
    }

    // -----------------------------------------------------------------------
    // Stack supervision
    // -----------------------------------------------------------------------

    /// Check the guard band of every created task and of idle.
    pub fn check_stacks(&self) -> Result<(), KernelError> {
        let idle = self
            .registry
            .get(TaskId::IDLE)
            .map(|tcb| (TaskId::IDLE, tcb));
        for (id, tcb) in self.registry.user_tasks().chain(idle) {
            // Safety: registered regions are 'static buffers
            if !unsafe { stack::guard_intact(&tcb.stack) } {
                error!("stack overflow in task {} {:?}", id, tcb.name);
                return Err(KernelError::StackOverflow { task: id });
            }
        }
        Ok(())
    }

    /// Words at the bottom of `id`'s stack that were never written.
    pub fn stack_unused(&self, id: TaskId) -> Option<usize> {
        self.registry
            .get(id)
            // Safety: registered regions are 'static buffers
            .map(|tcb| unsafe { stack::unused_words(&tcb.stack) })
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn arch(&self) -> &'a A {
        self.arch
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Number of user tasks created (idle excluded).
    pub fn task_count(&self) -> usize {
        self.registry.count()
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskControlBlock<A::Context>> {
        self.registry.get(id)
    }

    /// User tasks in creation order.
    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &TaskControlBlock<A::Context>)> {
        self.registry.user_tasks()
    }
}

/// Entry of the idle task: wait for the next interrupt, forever.
unsafe extern "C" fn idle_entry<A: Arch>(_: *const (), _: usize) -> ! {
    loop {
        A::wait_for_interrupt();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
