//! Strongly-typed identifiers for kernel processes and async workers.

use std::fmt;

/// Identifies a process registered with a kernel.
///
/// Processes are registered before the simulation starts and assigned
/// sequential IDs in registration order. IDs are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ProcessId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies an async worker within a kernel's worker registry.
///
/// Assigned in creation order; the registry is append-only so IDs are
/// never reused for the lifetime of the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for WorkerId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_as_plain_numbers() {
        assert_eq!(ProcessId(7).to_string(), "7");
        assert_eq!(WorkerId(0).to_string(), "0");
    }

    #[test]
    fn ids_order_by_value() {
        assert!(ProcessId(1) < ProcessId(2));
        assert!(WorkerId(3) > WorkerId(2));
    }
}
