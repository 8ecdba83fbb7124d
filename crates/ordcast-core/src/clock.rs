//! Lamport logical clock with a per-process tie-break suffix.
//!
//! A timestamp is conceptually the scalar `ticks.pid`: an integral tick count
//! followed by a fractional suffix that only the owning process ever produces.
//! The suffix makes every timestamp in the cluster unique, so ordering by
//! timestamp is a strict total order with no ties.
//!
//! The scalar is stored exactly as the pair `(ticks, pid)` and compared
//! lexicographically, which is the same order as the decimal reading while
//! staying free of floating point rounding.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ProcessId;

/// A pid-suffixed logical timestamp.
///
/// Field order matters: the derived `Ord` compares `ticks` first and uses the
/// process suffix only to break ties.
///
/// At equal ticks the lower process id always comes first: tick 5 stamped by
/// process 1 precedes tick 5 stamped by process 2, even though a decimal
/// suffix rendering (`5.1` against `5.02`) would put process 2 first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    ticks: u64,
    pid: ProcessId,
}

impl Timestamp {
    /// Create a timestamp from its integral part and the owning process.
    pub const fn new(ticks: u64, pid: ProcessId) -> Self {
        Self { ticks, pid }
    }

    /// The lowest timestamp a process can hold: zero ticks plus its suffix.
    pub const fn floor(pid: ProcessId) -> Self {
        Self { ticks: 0, pid }
    }

    /// Integral part.
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// The process whose suffix this timestamp carries.
    pub const fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Smallest integer not below the scalar value.
    ///
    /// Process 0 has a zero suffix, so its timestamps are already integral.
    pub const fn ceil(&self) -> u64 {
        if self.pid.0 == 0 {
            self.ticks
        } else {
            self.ticks + 1
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pid.is_sentinel() {
            write!(f, "{}", self.ticks)
        } else {
            write!(f, "{}.{}", self.ticks, self.pid.0)
        }
    }
}

/// Scalar Lamport clock owned by a single process.
///
/// The clock only moves forward: [`increment`](Self::increment) advances by
/// `step`, [`set_time`](Self::set_time) catches up past an observed timestamp.
/// Every value it hands out carries this process's suffix.
#[derive(Debug, Clone)]
pub struct LogicalClock {
    pid: ProcessId,
    step: u64,
    current: Timestamp,
}

impl LogicalClock {
    /// Create a clock for `pid` that advances by `step` per event.
    ///
    /// A zero step would stall the clock, so it is raised to 1.
    pub fn new(pid: ProcessId, step: u64) -> Self {
        Self {
            pid,
            step: step.max(1),
            current: Timestamp::floor(pid),
        }
    }

    /// The owning process.
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Amount added per event.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Current time.
    pub fn now(&self) -> Timestamp {
        self.current
    }

    /// Advance by one step and return the new time. Called on every send and
    /// receive event.
    pub fn increment(&mut self) -> Timestamp {
        self.current.ticks = self.current.ticks.saturating_add(self.step);
        self.current
    }

    /// Catch up past an observed timestamp.
    ///
    /// Jumps to `ceil(candidate) + 1` with this process's suffix, which is
    /// strictly greater than the candidate. Never moves the clock backwards.
    pub fn set_time(&mut self, candidate: Timestamp) -> Timestamp {
        let target = Timestamp::new(candidate.ceil().saturating_add(1), self.pid);
        if target > self.current {
            self.current = target;
        }
        self.current
    }

    /// Reinitialize to the tie-break floor.
    pub fn reset(&mut self) {
        self.current = Timestamp::floor(self.pid);
    }
}
