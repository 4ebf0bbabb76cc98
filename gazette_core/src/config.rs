//! Configuration types for the event log.

/// What to do with an event whose type has no registered fold rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownEventPolicy {
    /// Log a warning and skip the event.
    #[default]
    Warn,
    /// Fail the replay.
    Reject,
}

/// Configuration of an [`EventLog`](crate::replay::EventLog).
#[derive(Debug, Clone)]
pub struct EventLogConfig {
    /// How replay treats events without a fold rule.
    ///
    /// Default: [`UnknownEventPolicy::Warn`]
    pub unknown_event_policy: UnknownEventPolicy,

    /// Whether `replay_events` starts from the latest snapshot and folds only the newer events.
    ///
    /// When `false`, every replay folds the whole history.
    ///
    /// Default: `true`
    pub use_snapshots: bool,

    /// Upper bound applied to the `limit` of cursor and by-type scans.
    ///
    /// Default: 1,000 events
    pub max_batch_size: u32,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            unknown_event_policy: UnknownEventPolicy::Warn,
            use_snapshots: true,
            max_batch_size: 1_000,
        }
    }
}

impl EventLogConfig {
    /// Sets the policy for events without a fold rule.
    pub fn with_unknown_event_policy(mut self, policy: UnknownEventPolicy) -> Self {
        self.unknown_event_policy = policy;
        self
    }

    /// Enables or disables snapshot-aware replay.
    pub fn with_snapshots(mut self, use_snapshots: bool) -> Self {
        self.use_snapshots = use_snapshots;
        self
    }

    /// Sets the upper bound for scan limits. Values below 1 are raised to 1.
    pub fn with_max_batch_size(mut self, max_batch_size: u32) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Clamps a caller supplied scan limit to `max_batch_size`.
    pub fn clamp_limit(&self, limit: u32) -> u32 {
        limit.min(self.max_batch_size)
    }
}
