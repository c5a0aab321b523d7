//! Single-crate facade over the tact simulation framework.
//!
//! tact is a cooperative discrete-event simulation kernel in the
//! SystemC mold: thread processes with their own stacks, delta cycles,
//! a picosecond clock, and a global time quantum. Its distinguishing
//! piece is the async execution bridge, which lets a process push an
//! expensive device or processor model onto a native OS thread while
//! simulated time keeps flowing in step with the model's reported
//! progress.
//!
//! # Quick start
//!
//! ```
//! use tact::prelude::*;
//! use tact_test_utils::CountingCore;
//!
//! let mut kernel = Kernel::with_quantum(SimTime::from_us(1));
//! let cpu = Processor::spawn(
//!     &mut kernel,
//!     ProcessorConfig::default(),
//!     CountingCore::new("cpu0"),
//! )
//! .unwrap();
//! kernel.spawn_thread("watchdog", |ph| {
//!     while ph.wait(SimTime::from_us(5)).is_ok() {}
//! });
//! kernel.run_for(SimTime::from_us(10)).unwrap();
//! assert_eq!(kernel.time_stamp(), SimTime::from_us(10));
//! assert!(cpu.cycle_count() > 0);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types: time, identifiers, errors, and the core trait.
pub use tact_core as types;
/// Processor run loops over the kernel.
pub use tact_engine as engine;
/// The scheduler, processes, and the async bridge.
pub use tact_kernel as kernel;

/// The most common imports, in one place.
pub mod prelude {
    pub use tact_core::{
        CycleCore, FatalError, ProcessId, SimError, SimTime, Stopped, WorkerId,
    };
    pub use tact_engine::{ConfigError, Processor, ProcessorConfig, ProcessorHandle, RunStats};
    pub use tact_kernel::bridge::{async_run, is_async, progress, sync_call};
    pub use tact_kernel::{
        current_process, is_method, is_thread, Kernel, KernelHandle, ProcessHandle, ProcessKind,
        ShutdownReport,
    };
}
