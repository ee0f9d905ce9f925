//! # Error Types
//!
//! Every fallible layer of the engine owns a small `thiserror` enum. The
//! [`RtdbError`] wrapper exists for callers (the server binary, the control
//! surface) that need to bubble any of them up through a single `?`.

use thiserror::Error;

/// Failures raised while reassembling inbound WebSocket frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The partial-frame buffer grew past its per-session or global cap.
    #[error("inbound frame buffer exceeded {limit} bytes")]
    BufferOverflow { limit: usize },
}

/// Failures raised while turning a parsed JSON value into a [`crate::protocol::Message`].
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("data frame has no body")]
    MissingBody,
    #[error("malformed data frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Token decoding failures. All three map to the `invalid_token` status on the wire.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature did not verify")]
    InvalidSignature,
    #[error("token is outside its validity window")]
    InvalidTimestamp,
    #[error("token could not be decoded: {0}")]
    Malformed(String),
}

/// Data store failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("merge payload at '{0}' must be an object")]
    InvalidMerge(String),
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

/// Rule engine failures. These are distinct from a denial, which is a normal outcome.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("rules document is invalid: {0}")]
    InvalidDocument(String),
    #[error("rule at '{path}' uses an unsupported expression: {expression}")]
    UnsupportedExpression { path: String, expression: String },
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Umbrella error for callers that cross module boundaries.
#[derive(Debug, Error)]
pub enum RtdbError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RtdbError>;
