//! Strong type definitions for ordcast.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a process in the cluster.
///
/// Process ids are non-negative for real processes. The value `-1` is reserved
/// for readiness sentinels, which never reach application logic.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub i32);

impl ProcessId {
    /// Sender id carried by readiness sentinels.
    pub const SENTINEL: Self = Self(-1);

    /// Create a process id.
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub const fn get(&self) -> i32 {
        self.0
    }

    /// Whether this is the readiness sentinel id.
    pub const fn is_sentinel(&self) -> bool {
        self.0 == Self::SENTINEL.0
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl From<i32> for ProcessId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}
