use std::time::Duration;

use crate::errors::ConfigError;

/// Throttling and capacity settings for a `ResponseBuilder`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Target ceiling on snapshots per second for plain token traffic.
    pub max_emit_rate: u32,
    /// Longest time between snapshots while events keep arriving.
    pub max_interval: Duration,
    /// Buffered characters that force a snapshot regardless of timing.
    pub size_threshold: usize,
    /// Status lines retained per step.
    pub event_message_cap: usize,
    /// Annotations retained per step.
    pub annotation_cap: usize,
    /// Bounded channel size between the driver task and the consumer.
    pub snapshot_buffer_capacity: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_emit_rate: 10,
            max_interval: Duration::from_secs(1),
            size_threshold: 16 * 1024,
            event_message_cap: 50,
            annotation_cap: 100,
            snapshot_buffer_capacity: 128,
        }
    }
}

impl BuilderConfig {
    /// Builds a config from `REASONING_STREAM_*` variables, falling back to
    /// defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(rate) = env_parse("REASONING_STREAM_MAX_EMIT_RATE")? {
            config.max_emit_rate = rate;
        }
        if let Some(ms) = env_parse::<u64>("REASONING_STREAM_MAX_INTERVAL_MS")? {
            config.max_interval = Duration::from_millis(ms);
        }
        if let Some(size) = env_parse("REASONING_STREAM_SIZE_THRESHOLD")? {
            config.size_threshold = size;
        }
        if let Some(cap) = env_parse("REASONING_STREAM_EVENT_MESSAGE_CAP")? {
            config.event_message_cap = cap;
        }
        if let Some(cap) = env_parse("REASONING_STREAM_ANNOTATION_CAP")? {
            config.annotation_cap = cap;
        }
        if let Some(cap) = env_parse("REASONING_STREAM_SNAPSHOT_BUFFER")? {
            config.snapshot_buffer_capacity = cap;
        }
        config.validate()?;
        Ok(config)
    }

    /// Sets the maximum emission rate (snapshots per second).
    pub fn max_emit_rate(mut self, rate: u32) -> Self {
        self.max_emit_rate = rate;
        self
    }

    /// Sets the minimum interval directly; converted to a rate, rounded down
    /// to at least one snapshot per second.
    pub fn min_interval(mut self, interval: Duration) -> Self {
        let per_sec = Duration::from_secs(1).as_nanos() / interval.as_nanos().max(1);
        self.max_emit_rate = per_sec.clamp(1, u32::MAX as u128) as u32;
        self
    }

    /// Sets the safety ceiling between snapshots.
    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Sets the buffered-character threshold.
    pub fn size_threshold(mut self, chars: usize) -> Self {
        self.size_threshold = chars;
        self
    }

    /// Sets the per-step status line cap.
    pub fn event_message_cap(mut self, cap: usize) -> Self {
        self.event_message_cap = cap;
        self
    }

    /// Sets the per-step annotation cap.
    pub fn annotation_cap(mut self, cap: usize) -> Self {
        self.annotation_cap = cap;
        self
    }

    /// Sets the driver's snapshot channel size.
    pub fn snapshot_buffer_capacity(mut self, capacity: usize) -> Self {
        self.snapshot_buffer_capacity = capacity;
        self
    }

    /// Minimum time between rate-limited snapshots.
    pub fn min_emit_interval(&self) -> Duration {
        Duration::from_secs(1) / self.max_emit_rate.max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_emit_rate == 0 {
            return Err(ConfigError::Invalid(
                "max_emit_rate must be greater than 0".into(),
            ));
        }
        if self.max_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "max_interval must be greater than 0".into(),
            ));
        }
        if self.size_threshold == 0 {
            return Err(ConfigError::Invalid(
                "size_threshold must be greater than 0".into(),
            ));
        }
        if self.event_message_cap == 0 || self.annotation_cap == 0 {
            return Err(ConfigError::Invalid(
                "event_message_cap and annotation_cap must be greater than 0".into(),
            ));
        }
        if self.snapshot_buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "snapshot_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse().map(Some).map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: raw.clone(),
    })
}
