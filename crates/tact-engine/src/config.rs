//! Processor run-loop configuration.

use std::error::Error;
use std::fmt;

use tact_core::SimTime;

const PS_PER_SEC: u64 = 1_000_000_000_000;

/// Configuration for a [`Processor`](crate::Processor).
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    /// Simulated duration of one core clock cycle.
    pub clock: SimTime,
    /// Run core batches on the async bridge instead of inline on the
    /// process thread.
    pub allow_async: bool,
    /// Number of sub-batches an async quantum is split into. Higher
    /// values interleave progress reports more finely at the cost of
    /// more synchronization.
    pub async_rate: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            clock: SimTime::from_ns(10),
            allow_async: false,
            async_rate: 5,
        }
    }
}

impl ProcessorConfig {
    /// Configuration for a core clocked at `hz`. A zero frequency
    /// yields a zero clock period, rejected by [`Self::validate`].
    pub fn with_frequency(hz: u64) -> Self {
        let clock = if hz == 0 {
            SimTime::ZERO
        } else {
            SimTime::from_ps(PS_PER_SEC / hz)
        };
        Self {
            clock,
            ..Self::default()
        }
    }

    /// Checks the configuration before a processor is spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock.is_zero() {
            return Err(ConfigError::ZeroClockPeriod);
        }
        if self.async_rate == 0 {
            return Err(ConfigError::ZeroAsyncRate);
        }
        if self.async_rate > 10 {
            tracing::warn!(
                rate = self.async_rate,
                "async rate is unusually high; sub-batches may round down to single cycles"
            );
        }
        Ok(())
    }
}

/// Rejected processor configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The clock period must be non-zero.
    ZeroClockPeriod,
    /// The async rate must be non-zero.
    ZeroAsyncRate,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroClockPeriod => write!(f, "clock period must be greater than zero"),
            Self::ZeroAsyncRate => write!(f, "async rate must be greater than zero"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        ProcessorConfig::default().validate().unwrap();
    }

    #[test]
    fn frequency_sets_the_clock_period() {
        let config = ProcessorConfig::with_frequency(100_000_000);
        assert_eq!(config.clock, SimTime::from_ns(10));
        let config = ProcessorConfig::with_frequency(1_000_000_000);
        assert_eq!(config.clock, SimTime::from_ns(1));
    }

    #[test]
    fn zero_frequency_is_rejected() {
        let config = ProcessorConfig::with_frequency(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroClockPeriod));
    }

    #[test]
    fn zero_async_rate_is_rejected() {
        let config = ProcessorConfig {
            async_rate: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroAsyncRate));
    }

    #[test]
    fn high_async_rate_still_validates() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let config = ProcessorConfig {
            async_rate: 32,
            ..Default::default()
        };
        config.validate().unwrap();
    }
}
