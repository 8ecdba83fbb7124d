//! Cooperative termination.
//!
//! A process that has finished generating updates does not simply leave: a
//! peer may still need its acks. Instead it drains its own queue, multicasts
//! an exit probe and listens for a grace interval. Any peer that is not ready
//! to let it go answers with a poke, and the attempt starts over.
//!
//! ```text
//! Running --request--> LocalDrainWait --queue empty--> ProbeSent
//!                          ^    ^                         |
//!                          |    +------- interrupted -----+
//!                          |                              |
//!                       Deferred <--- poked or queued --- + ---> Granted
//! ```
//!
//! The protocol is best effort. It bounds the delay between the last probe
//! and exit but does not prove that no message is still in flight.

/// Where the local process stands in the exit negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Still generating updates.
    Running,
    /// Generation is done; waiting for the delivery queue to empty.
    LocalDrainWait,
    /// Probe multicast; grace interval in progress.
    ProbeSent,
    /// No objection heard. Safe to shut down.
    Granted,
    /// A peer objected or new work arrived. The next attempt starts shortly.
    Deferred,
}

/// Exit negotiation state and its two flags.
#[derive(Debug, Clone)]
pub struct ExitProtocol {
    state: ExitState,
    ok_to_exit_locally: bool,
    ok_to_let_peers_exit: bool,
    attempts: u32,
}

impl Default for ExitProtocol {
    fn default() -> Self {
        Self {
            state: ExitState::Running,
            ok_to_exit_locally: false,
            ok_to_let_peers_exit: false,
            attempts: 0,
        }
    }
}

impl ExitProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ExitState {
        self.state
    }

    /// Whether the application has finished generating updates.
    pub fn requested(&self) -> bool {
        self.state != ExitState::Running
    }

    /// Whether a peer's exit probe should be granted by silence.
    pub fn ok_to_let_peers_exit(&self) -> bool {
        self.ok_to_let_peers_exit
    }

    pub fn ok_to_exit_locally(&self) -> bool {
        self.ok_to_exit_locally
    }

    /// Number of probes sent so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The application is done generating.
    pub fn request(&mut self) {
        if self.state == ExitState::Running {
            self.state = ExitState::LocalDrainWait;
        }
    }

    /// The local queue still holds updates. Object to every peer probe until
    /// it drains.
    pub fn hold(&mut self) {
        self.state = ExitState::LocalDrainWait;
        self.ok_to_exit_locally = false;
        self.ok_to_let_peers_exit = false;
    }

    /// The local queue is empty and a probe is going out.
    pub fn probe(&mut self) {
        self.state = ExitState::ProbeSent;
        self.ok_to_exit_locally = true;
        self.ok_to_let_peers_exit = true;
        self.attempts += 1;
    }

    /// A peer asked this process to keep waiting.
    pub fn poked(&mut self) {
        self.ok_to_exit_locally = false;
    }

    /// The grace wait was cut short. Nothing can be concluded from it.
    pub fn interrupted(&mut self) {
        self.hold();
    }

    /// Decide the attempt once the grace interval and the final receive pass
    /// are over.
    pub fn conclude(&mut self, queue_empty: bool) -> ExitState {
        self.state = if self.ok_to_exit_locally && queue_empty {
            ExitState::Granted
        } else {
            ExitState::Deferred
        };
        self.state
    }
}
