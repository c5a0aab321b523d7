//! Test doubles shared across the tact crates.
//!
//! The cores here implement [`CycleCore`] with predictable behaviors:
//! counting cycles, refusing to advance, burning host time, or
//! violating the monotonic cycle-count contract on purpose.

#![forbid(unsafe_code)]

use std::time::Duration;

use tact_core::CycleCore;

/// Executes every requested cycle instantly.
pub struct CountingCore {
    name: String,
    count: u64,
}

impl CountingCore {
    /// Creates a core with a zero cycle count.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
        }
    }
}

impl CycleCore for CountingCore {
    fn name(&self) -> &str {
        &self.name
    }

    fn simulate(&mut self, cycles: u64) {
        self.count += cycles;
    }

    fn cycle_count(&self) -> u64 {
        self.count
    }
}

/// Never executes a cycle, like a core parked at a halt instruction.
pub struct HaltedCore {
    name: String,
    count: u64,
}

impl HaltedCore {
    /// Creates a halted core.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
        }
    }
}

impl CycleCore for HaltedCore {
    fn name(&self) -> &str {
        &self.name
    }

    fn simulate(&mut self, _cycles: u64) {}

    fn cycle_count(&self) -> u64 {
        self.count
    }
}

/// Counts cycles but burns real host time for every batch, standing in
/// for an expensive instruction-set simulator.
pub struct SleepyCore {
    name: String,
    count: u64,
    per_batch: Duration,
}

impl SleepyCore {
    /// Creates a core that sleeps `per_batch` on every simulate call.
    pub fn new(name: &str, per_batch: Duration) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
            per_batch,
        }
    }
}

impl CycleCore for SleepyCore {
    fn name(&self) -> &str {
        &self.name
    }

    fn simulate(&mut self, cycles: u64) {
        std::thread::sleep(self.per_batch);
        self.count += cycles;
    }

    fn cycle_count(&self) -> u64 {
        self.count
    }
}

/// Breaks the monotonic cycle-count contract after a set number of
/// batches.
pub struct RegressingCore {
    name: String,
    count: u64,
    batches: u64,
    regress_after: u64,
}

impl RegressingCore {
    /// Creates a core that runs normally for `regress_after` batches,
    /// then reports a lower cycle count.
    pub fn new(name: &str, regress_after: u64) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
            batches: 0,
            regress_after,
        }
    }
}

impl CycleCore for RegressingCore {
    fn name(&self) -> &str {
        &self.name
    }

    fn simulate(&mut self, cycles: u64) {
        self.batches += 1;
        if self.batches > self.regress_after {
            self.count = self.count.saturating_sub(cycles.max(1));
        } else {
            self.count += cycles;
        }
    }

    fn cycle_count(&self) -> u64 {
        self.count
    }
}
