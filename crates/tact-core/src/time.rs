//! Simulated time as a raw-picosecond duration.
//!
//! All simulated durations and timestamps in tact are [`SimTime`] values.
//! The representation is a plain `u64` picosecond count, which keeps the
//! type `Copy`, cheap to store in atomics (see the async progress
//! accumulator in `tact-kernel`), and exact for clock periods down to
//! terahertz rates.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// A span of simulated time (or a timestamp measured from simulation start).
///
/// Backed by a `u64` picosecond count. At one picosecond resolution the
/// representable range is about 213 days of simulated time, far beyond any
/// practical quantum-stepped run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimTime(u64);

impl SimTime {
    /// The zero duration. Waiting zero time yields one delta cycle.
    pub const ZERO: SimTime = SimTime(0);

    /// From raw picoseconds.
    pub const fn from_ps(ps: u64) -> Self {
        SimTime(ps)
    }

    /// From nanoseconds.
    pub const fn from_ns(ns: u64) -> Self {
        SimTime(ns * 1_000)
    }

    /// From microseconds.
    pub const fn from_us(us: u64) -> Self {
        SimTime(us * 1_000_000)
    }

    /// From milliseconds.
    pub const fn from_ms(ms: u64) -> Self {
        SimTime(ms * 1_000_000_000)
    }

    /// From whole seconds.
    pub const fn from_secs(s: u64) -> Self {
        SimTime(s * 1_000_000_000_000)
    }

    /// The raw picosecond count.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this is the zero duration.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Subtraction clamped at zero.
    pub const fn saturating_sub(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(other.0))
    }

    /// How many whole periods of `period` fit into this span.
    ///
    /// Returns 0 when `period` is zero; callers validate periods up front.
    pub const fn full_periods(self, period: SimTime) -> u64 {
        if period.0 == 0 {
            0
        } else {
            self.0 / period.0
        }
    }

    /// This span as fractional seconds, for display and statistics only.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e12
    }
}

impl Add for SimTime {
    type Output = SimTime;
    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        self.0 += rhs.0;
    }
}

impl Sub for SimTime {
    type Output = SimTime;
    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl SubAssign for SimTime {
    fn sub_assign(&mut self, rhs: SimTime) {
        self.0 -= rhs.0;
    }
}

impl Mul<u64> for SimTime {
    type Output = SimTime;
    fn mul(self, rhs: u64) -> SimTime {
        SimTime(self.0 * rhs)
    }
}

impl Sum for SimTime {
    fn sum<I: Iterator<Item = SimTime>>(iter: I) -> SimTime {
        iter.fold(SimTime::ZERO, Add::add)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ps = self.0;
        let (value, unit) = if ps == 0 {
            (0, "s")
        } else if ps % 1_000_000_000_000 == 0 {
            (ps / 1_000_000_000_000, "s")
        } else if ps % 1_000_000_000 == 0 {
            (ps / 1_000_000_000, "ms")
        } else if ps % 1_000_000 == 0 {
            (ps / 1_000_000, "us")
        } else if ps % 1_000 == 0 {
            (ps / 1_000, "ns")
        } else {
            (ps, "ps")
        };
        write!(f, "{value} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn constructors_scale() {
        assert_eq!(SimTime::from_ns(1).raw(), 1_000);
        assert_eq!(SimTime::from_us(1).raw(), 1_000_000);
        assert_eq!(SimTime::from_ms(1).raw(), 1_000_000_000);
        assert_eq!(SimTime::from_secs(1).raw(), 1_000_000_000_000);
    }

    #[test]
    fn arithmetic() {
        let a = SimTime::from_ns(3);
        let b = SimTime::from_ns(2);
        assert_eq!(a + b, SimTime::from_ns(5));
        assert_eq!(a - b, SimTime::from_ns(1));
        assert_eq!(b * 4, SimTime::from_ns(8));
        assert_eq!(b.saturating_sub(a), SimTime::ZERO);
    }

    #[test]
    fn full_periods_floors() {
        let quantum = SimTime::from_us(1);
        let period = SimTime::from_ns(3);
        // 1000ns / 3ns = 333 whole periods.
        assert_eq!(quantum.full_periods(period), 333);
        // Degenerate zero period: defined as 0, callers reject it earlier.
        assert_eq!(quantum.full_periods(SimTime::ZERO), 0);
    }

    #[test]
    fn display_picks_largest_exact_unit() {
        assert_eq!(SimTime::from_secs(5).to_string(), "5 s");
        assert_eq!(SimTime::from_ms(10).to_string(), "10 ms");
        assert_eq!(SimTime::from_ns(7).to_string(), "7 ns");
        assert_eq!(SimTime::from_ps(1234).to_string(), "1234 ps");
        assert_eq!(SimTime::ZERO.to_string(), "0 s");
    }

    #[test]
    fn sum_of_durations() {
        let total: SimTime = [SimTime::from_ns(1), SimTime::from_ns(2), SimTime::from_ns(3)]
            .into_iter()
            .sum();
        assert_eq!(total, SimTime::from_ns(6));
    }

    proptest! {
        #[test]
        fn addition_matches_raw(a in 0u64..1u64 << 40, b in 0u64..1u64 << 40) {
            let t = SimTime::from_ps(a) + SimTime::from_ps(b);
            prop_assert_eq!(t.raw(), a + b);
        }

        #[test]
        fn saturating_sub_never_underflows(a in 0u64..1u64 << 40, b in 0u64..1u64 << 40) {
            let t = SimTime::from_ps(a).saturating_sub(SimTime::from_ps(b));
            prop_assert_eq!(t.raw(), a.saturating_sub(b));
        }
    }
}
