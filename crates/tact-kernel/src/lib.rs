//! Cooperative discrete-event kernel for tact.
//!
//! The kernel schedules thread processes and method callbacks over a
//! simulated clock with picosecond resolution. Processes run one at a
//! time and yield through `wait()` calls; the [`bridge`] module lets a
//! process offload heavy work to a native thread without breaking that
//! cooperative contract.
//!
//! # Quick start
//!
//! ```
//! use tact_core::SimTime;
//! use tact_kernel::Kernel;
//!
//! let mut kernel = Kernel::new();
//! kernel.spawn_thread("timer", |ph| {
//!     let _ = ph.wait(SimTime::from_us(5));
//! });
//! kernel.run().unwrap();
//! assert_eq!(kernel.time_stamp(), SimTime::from_us(5));
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bridge;
mod observer;
mod process;
pub mod report;
mod scheduler;
mod worker;

pub use process::{current_process, current_process_kind, is_method, is_thread};
pub use process::{ProcessHandle, ProcessKind};
pub use scheduler::{Kernel, KernelHandle, ShutdownReport, DEFAULT_QUANTUM};
