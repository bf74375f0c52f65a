/// Failures of the upstream event source, surfaced after finalization.
///
/// Malformed individual events never produce a `StreamError`; they are
/// recovered by the normalizer. Only the source itself can fail a stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum StreamError {
    /// The byte stream or connection carrying the events failed.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// The source delivered something that cannot be a stream at all.
    #[error("protocol error: {message}")]
    Protocol { message: String },
    /// The caller aborted the stream. A final snapshot is still produced.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamError {
    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns `true` for caller-initiated cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(value: reqwest::Error) -> Self {
        StreamError::transport(format!("response body read failed: {value}"))
    }
}

impl From<std::io::Error> for StreamError {
    fn from(value: std::io::Error) -> Self {
        StreamError::transport(value.to_string())
    }
}

/// Invalid builder configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A configured value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// An environment variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    Env { key: String, value: String },
}
