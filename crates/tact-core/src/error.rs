//! Error types for the tact simulation framework.
//!
//! Two severities exist in this system. [`FatalError`] covers the
//! abort-class conditions of the execution bridge and run loop: continuing
//! past any of them risks silently corrupting simulated time, so they are
//! raised through the central reporting channel and terminate the run.
//! [`SimError`] is the host-visible outcome of a run that was terminated
//! by such a condition.

use std::error::Error;
use std::fmt;

use crate::time::SimTime;

/// Abort-class conditions raised by the execution bridge and run loop.
///
/// None of these are recoverable: each indicates either an API usage
/// violation or an internal consistency failure after which the
/// simulated-time model can no longer be trusted. They are reported
/// through `report::fatal()` in `tact-kernel`, which logs the condition
/// and unwinds the offending process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FatalError {
    /// `async_run` was called outside a thread process (from a method
    /// process, from within an async task, or from a plain host thread).
    AsyncFromInvalidContext,
    /// `progress` was called with no async task active on this thread.
    ProgressOutsideAsync,
    /// `sync_call` was called from a thread that is neither in kernel
    /// context nor inside a recognized async task.
    SyncCallOutsideContext,
    /// A model's cycle counter was observed to decrease between reads.
    CycleCountRegressed {
        /// The previously observed cycle count.
        was: u64,
        /// The newly observed, smaller cycle count.
        now: u64,
    },
    /// A run-loop iteration completed without advancing local simulated
    /// time, indicating a broken clock or cycle-count configuration.
    StuckInTime {
        /// The local timestamp at which the loop failed to advance.
        at: SimTime,
    },
    /// An async worker was constructed with no owning kernel process.
    WorkerWithoutProcess,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsyncFromInvalidContext => {
                write!(f, "async_run must be called from a thread process")
            }
            Self::ProgressOutsideAsync => {
                write!(f, "progress reported outside an async task")
            }
            Self::SyncCallOutsideContext => {
                write!(f, "sync_call requires kernel or async-task context")
            }
            Self::CycleCountRegressed { was, now } => {
                write!(f, "cycle count regressed from {was} to {now}")
            }
            Self::StuckInTime { at } => {
                write!(f, "run loop stuck in time at {at}")
            }
            Self::WorkerWithoutProcess => {
                write!(f, "async worker requires an owning process")
            }
        }
    }
}

impl Error for FatalError {}

/// Host-visible failure of a simulation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimError {
    /// A process unwound with a panic, either a model bug or a
    /// [`FatalError`] raised inside it. The simulation is no longer
    /// consistent and must be discarded.
    ProcessPanicked {
        /// Name of the process that unwound.
        process: String,
        /// The captured panic message.
        message: String,
    },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessPanicked { process, message } => {
                write!(f, "process '{process}' panicked: {message}")
            }
        }
    }
}

impl Error for SimError {}

/// Indication that the kernel is stopping and the calling process must
/// unwind its run loop and return.
///
/// Returned from `wait()`-family calls once shutdown has been requested.
/// This is a cooperative signal, not an error in the model: a process
/// receiving it should release any resources and return promptly so the
/// kernel can join its thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stopped;

impl fmt::Display for Stopped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "simulation stopped")
    }
}

impl Error for Stopped {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_error_display() {
        assert_eq!(
            FatalError::AsyncFromInvalidContext.to_string(),
            "async_run must be called from a thread process"
        );
        assert_eq!(
            FatalError::CycleCountRegressed { was: 10, now: 4 }.to_string(),
            "cycle count regressed from 10 to 4"
        );
        let stuck = FatalError::StuckInTime {
            at: SimTime::from_us(3),
        };
        assert_eq!(stuck.to_string(), "run loop stuck in time at 3 us");
    }

    #[test]
    fn sim_error_display_names_the_process() {
        let err = SimError::ProcessPanicked {
            process: "cpu0".into(),
            message: "stuck in time".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("cpu0"));
        assert!(msg.contains("stuck in time"));
    }

    #[test]
    fn stopped_is_an_error_type() {
        fn takes_error(_: &dyn Error) {}
        takes_error(&Stopped);
        assert_eq!(Stopped.to_string(), "simulation stopped");
    }
}
