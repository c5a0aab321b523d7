//! The cycle-core trait implemented by processor models.

/// A cycle-stepped processor model driven by the tact run loop.
///
/// This is the seam between the execution engine and instruction-set
/// simulators: the engine decides *how many* cycles to run before the
/// next synchronization point and on *which* native thread, the core
/// only executes them. Implementations are single-threaded; the engine
/// guarantees `simulate` is never called concurrently, though it may be
/// called from different native threads across batches.
pub trait CycleCore: Send {
    /// Human-readable model name, used in logs and error reports.
    fn name(&self) -> &str;

    /// Execute up to `cycles` cycles.
    ///
    /// A core may execute fewer (for example when it halts on a wait-for-
    /// interrupt state); the engine reads [`cycle_count`](Self::cycle_count)
    /// afterwards to learn how many actually ran. Executing zero cycles
    /// for an entire quantum is a fatal "stuck in time" condition.
    fn simulate(&mut self, cycles: u64);

    /// Total cycles executed since reset.
    ///
    /// Must be monotonically non-decreasing; the engine treats any
    /// observed decrease as a fatal internal-consistency error.
    fn cycle_count(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NopCore(u64);

    impl CycleCore for NopCore {
        fn name(&self) -> &str {
            "nop"
        }
        fn simulate(&mut self, cycles: u64) {
            self.0 += cycles;
        }
        fn cycle_count(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn trait_is_object_safe() {
        let mut core: Box<dyn CycleCore> = Box::new(NopCore(0));
        core.simulate(10);
        assert_eq!(core.cycle_count(), 10);
        assert_eq!(core.name(), "nop");
    }
}
