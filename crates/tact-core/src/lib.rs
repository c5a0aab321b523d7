//! Core types and traits for the tact simulation framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the tact workspace:
//! the simulated-time type, process/worker identifiers, the fatal error
//! taxonomy, and the cycle-core trait that processor models implement.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod time;
pub mod traits;

pub use error::{FatalError, SimError, Stopped};
pub use id::{ProcessId, WorkerId};
pub use time::SimTime;
pub use traits::CycleCore;
