//! Run-loop performance counters.

use std::time::Duration;

/// Cumulative counters for one processor's run loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Core cycles executed.
    pub cycles: u64,
    /// Simulate batches issued to the core.
    pub batches: u64,
    /// Host time spent inside the core's simulate calls.
    pub host_time: Duration,
}

impl RunStats {
    /// Executed cycles per host second, or zero before any host time
    /// has been measured.
    pub fn cycles_per_host_sec(&self) -> f64 {
        let secs = self.host_time.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.cycles as f64 / secs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_zero_without_host_time() {
        assert_eq!(RunStats::default().cycles_per_host_sec(), 0.0);
    }

    #[test]
    fn rate_reflects_measured_time() {
        let stats = RunStats {
            cycles: 1_000,
            batches: 10,
            host_time: Duration::from_secs(2),
        };
        assert_eq!(stats.cycles_per_host_sec(), 500.0);
    }
}
