//! Error types for the resilient client.

use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

use crate::state::FailureKind;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Every way a request through [`Client`](crate::Client) can fail.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Refused without a network attempt: the breaker is open and its
    /// cooldown has not elapsed.
    #[error("circuit breaker is open, retry after {retry_after:?}")]
    CircuitOpen {
        /// Time left until a probe will be admitted.
        retry_after: Duration,
    },

    /// Refused without a network attempt: the breaker is half-open and its
    /// single probe is still outstanding.
    #[error("circuit breaker probe already in progress")]
    ProbeInProgress,

    /// The attempt exceeded the configured deadline and was cancelled.
    #[error("request timed out after {after:?}")]
    Timeout {
        /// The deadline that expired.
        after: Duration,
    },

    /// The transport failed for a reason other than the deadline.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A response arrived with a status outside the accepted window.
    #[error("unsuccessful response status {status}")]
    Status {
        /// The status code received.
        status: u16,
        /// A bounded prefix of the response body.
        body: String,
    },

    /// The response body exceeded the configured byte cap.
    #[error("response body exceeded {limit} bytes")]
    Oversized {
        /// The configured cap.
        limit: usize,
    },

    /// The body arrived within bounds but did not decode into the expected shape.
    #[error("failed to decode response body: {source}")]
    Decode {
        /// The decoder error.
        source: serde_json::Error,
        /// A bounded prefix of the response body.
        body: String,
    },

    /// The caller-supplied path failed validation.
    #[error("invalid request path: {0}")]
    InvalidInput(String),

    /// The caller cancelled the attempt.
    #[error("request cancelled")]
    Cancelled,

    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// The breaker-facing classification of this error.
    ///
    /// Returns `None` for errors raised before admission (input validation,
    /// configuration, rejections); those never count against the breaker.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ClientError::Timeout { .. } => Some(FailureKind::Timeout),
            ClientError::Transport(_) => Some(FailureKind::Transport),
            ClientError::Status { .. } => Some(FailureKind::Status),
            ClientError::Oversized { .. } => Some(FailureKind::Oversized),
            ClientError::Decode { .. } => Some(FailureKind::Decode),
            ClientError::Cancelled => Some(FailureKind::Cancelled),
            ClientError::CircuitOpen { .. }
            | ClientError::ProbeInProgress
            | ClientError::InvalidInput(_)
            | ClientError::InvalidConfig(_) => None,
        }
    }

    /// Returns true when the call was refused by the breaker.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ClientError::CircuitOpen { .. } | ClientError::ProbeInProgress
        )
    }
}

/// Failure reported by a [`Transport`](crate::Transport).
#[derive(Error, Debug)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl TransportError {
    /// Creates a transport error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error wrapping an underlying cause.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Why the breaker refused to admit a call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Open with the cooldown still running.
    #[error("circuit breaker is open, retry after {retry_after:?}")]
    CircuitOpen {
        /// Time left until a probe will be admitted.
        retry_after: Duration,
    },

    /// Half-open with the probe still outstanding.
    #[error("circuit breaker probe already in progress")]
    ProbeInFlight,
}

impl From<Rejection> for ClientError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::CircuitOpen { retry_after } => ClientError::CircuitOpen { retry_after },
            Rejection::ProbeInFlight => ClientError::ProbeInProgress,
        }
    }
}
