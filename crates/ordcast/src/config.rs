//! Engine configuration.

use std::time::Duration;

use ordcast_core::ProcessId;

/// Configuration for the ordering engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// This process's identifier. Becomes the timestamp suffix.
    pub process_id: ProcessId,
    /// Clock increment per send or receive event.
    pub clock_step: u64,
    /// How long an exit probe waits for objections.
    pub grace_interval: Duration,
    /// Pause between loop iterations that found nothing to do.
    pub idle_poll: Duration,
    /// How long to wait on each link per readiness check.
    pub readiness_poll: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            process_id: ProcessId::new(0),
            clock_step: 1,
            grace_interval: Duration::from_secs(10),
            idle_poll: Duration::from_millis(1),
            readiness_poll: Duration::from_millis(20),
        }
    }
}

impl EngineConfig {
    /// Config for `process_id` ticking by `clock_step`, with default timings.
    pub fn new(process_id: ProcessId, clock_step: u64) -> Self {
        Self {
            process_id,
            clock_step,
            ..Self::default()
        }
    }

    pub fn with_grace_interval(mut self, grace: Duration) -> Self {
        self.grace_interval = grace;
        self
    }

    pub fn with_idle_poll(mut self, idle: Duration) -> Self {
        self.idle_poll = idle;
        self
    }

    pub fn with_readiness_poll(mut self, poll: Duration) -> Self {
        self.readiness_poll = poll;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.clock_step, 1);
        assert_eq!(config.grace_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new(ProcessId::new(3), 5)
            .with_grace_interval(Duration::from_millis(200))
            .with_idle_poll(Duration::from_millis(2));

        assert_eq!(config.process_id, ProcessId::new(3));
        assert_eq!(config.clock_step, 5);
        assert_eq!(config.grace_interval, Duration::from_millis(200));
        assert_eq!(config.idle_poll, Duration::from_millis(2));
    }
}
