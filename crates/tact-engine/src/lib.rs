//! Quantum-stepped processor run loops on top of the tact kernel.
//!
//! The engine turns a [`CycleCore`](tact_core::CycleCore) into a
//! scheduled simulation process. Each pass through the loop runs the
//! core for up to one global time quantum of cycles, then surrenders
//! the elapsed simulated time to the scheduler, either inline or
//! through the async bridge.
//!
//! ```
//! use tact_core::SimTime;
//! use tact_engine::{Processor, ProcessorConfig};
//! use tact_kernel::Kernel;
//! use tact_test_utils::CountingCore;
//!
//! let mut kernel = Kernel::with_quantum(SimTime::from_us(1));
//! let cpu = Processor::spawn(
//!     &mut kernel,
//!     ProcessorConfig::default(),
//!     CountingCore::new("cpu0"),
//! )
//! .unwrap();
//! kernel.run_for(SimTime::from_us(10)).unwrap();
//! assert!(cpu.cycle_count() >= 1_000);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod config;
mod processor;
mod stats;

pub use config::{ConfigError, ProcessorConfig};
pub use processor::{Processor, ProcessorHandle};
pub use stats::RunStats;
