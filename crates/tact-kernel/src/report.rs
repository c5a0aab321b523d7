//! Fatal error reporting.
//!
//! A fatal error is an API misuse or a broken model invariant that the
//! kernel cannot recover from. Reporting one logs the error and panics
//! the calling thread. When the caller is a simulation process or an
//! async task, the kernel catches the panic at the process boundary and
//! surfaces it as [`SimError::ProcessPanicked`] from the run loop.
//!
//! [`SimError::ProcessPanicked`]: tact_core::SimError::ProcessPanicked

use tact_core::FatalError;

/// Reports a fatal simulation error and unwinds the calling thread.
pub fn fatal(err: FatalError) -> ! {
    tracing::error!(error = %err, "fatal simulation error");
    panic!("{err}");
}
