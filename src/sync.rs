//! # Synchronization Primitives
//!
//! Critical sections over the `Arch` interrupt-state token. Entering
//! returns the previous state and exiting restores exactly that state, so
//! sections nest to any depth and only the outermost exit re-enables
//! interrupts (if they were enabled before it).

use crate::arch::Arch;

/// RAII critical section. Interrupts stay suppressed until it is dropped.
pub struct CriticalSection<'a, A: Arch> {
    arch: &'a A,
    state: A::IrqState,
}

impl<'a, A: Arch> CriticalSection<'a, A> {
    #[inline]
    pub fn enter(arch: &'a A) -> Self {
        let state = arch.enter_critical();
        Self { arch, state }
    }
}

impl<A: Arch> Drop for CriticalSection<'_, A> {
    #[inline]
    fn drop(&mut self) {
        self.arch.exit_critical(self.state);
    }
}

/// Execute a closure within a critical section (interrupts disabled).
///
/// ```ignore
/// sync::critical_section(&arch, |_cs| {
///     // Access shared state safely
/// });
/// ```
///
/// Keep critical sections as short as possible to minimize interrupt latency.
#[inline]
pub fn critical_section<A, F, R>(arch: &A, f: F) -> R
where
    A: Arch,
    F: FnOnce(&CriticalSection<'_, A>) -> R,
{
    let cs = CriticalSection::enter(arch);
    f(&cs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::Sim;
    use proptest::prelude::*;

    #[test]
    fn test_guard_restores_on_drop() {
        let sim = Sim::new();
        {
            let _cs = CriticalSection::enter(&sim);
            assert!(!sim.interrupts_enabled());
        }
        assert!(sim.interrupts_enabled());
    }

    #[test]
    fn test_closure_returns_value() {
        let sim = Sim::new();
        let value = critical_section(&sim, |_| {
            assert!(!sim.interrupts_enabled());
            42
        });
        assert_eq!(value, 42);
        assert!(sim.interrupts_enabled());
    }

    #[test]
    fn test_section_entered_with_interrupts_disabled_stays_disabled() {
        let sim = Sim::new();
        let outer = sim.enter_critical();
        critical_section(&sim, |_| {
            let _inner = CriticalSection::enter(&sim);
        });
        assert!(!sim.interrupts_enabled());
        sim.exit_critical(outer);
        assert!(sim.interrupts_enabled());
    }

    proptest! {
        #[test]
        fn prop_nesting_restores_outermost_state(depth in 1usize..32, start_enabled: bool) {
            let sim = Sim::new();
            let pre = if start_enabled { None } else { Some(sim.enter_critical()) };

            let mut tokens = std::vec::Vec::new();
            for _ in 0..depth {
                tokens.push(sim.enter_critical());
            }
            while let Some(token) = tokens.pop() {
                prop_assert!(!sim.interrupts_enabled());
                sim.exit_critical(token);
            }
            prop_assert_eq!(sim.interrupts_enabled(), start_enabled);

            if let Some(token) = pre {
                sim.exit_critical(token);
            }
            prop_assert!(sim.interrupts_enabled());
        }
    }
}
