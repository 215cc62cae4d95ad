use crate::model::{Batch, Operation, OperationError, ServiceFault};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the batch engine.
///
/// This aggregates wire, transport and per-operation failures into the
/// categories callers actually branch on. Per-operation and per-batch
/// variants carry enough structured context (correlation id, batch id,
/// HTTP status) to support programmatic retry by the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Service throttling exceeded: {}", .fault.message)]
    Throttling {
        fault: ServiceFault,
        retry_after: Option<Duration>,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("{0}")]
    Operation(Box<OperationFailure>),

    #[error("{0}")]
    Batch(Box<BatchFailure>),

    #[error("Authentication error: {message}")]
    Authentication { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

/// A single request inside an otherwise-delivered batch failed.
///
/// Carries the offending descriptor so the caller can correct and resend it.
#[derive(Debug)]
pub struct OperationFailure {
    pub batch_id: Option<String>,
    pub operation: Operation,
    pub entity_name: String,
    pub error: Option<OperationError>,
    pub status_code: u16,
    pub correlation_id: Uuid,
}

impl OperationFailure {
    pub fn content_id(&self) -> &str {
        self.operation.content_id.as_deref().unwrap_or("")
    }
}

impl std::fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            Some(err) => write!(
                f,
                "Operation {} failed: {} {}",
                self.content_id(),
                err.code.as_deref().unwrap_or(""),
                err.message
            ),
            None => write!(
                f,
                "Operation {} failed: HTTP {}",
                self.content_id(),
                self.status_code
            ),
        }
    }
}

/// A batch-level transport/protocol failure.
///
/// The whole batch is attached for diagnostics and replay.
#[derive(Debug)]
pub struct BatchFailure {
    pub message: String,
    pub batch: Batch,
    pub correlation_id: Uuid,
}

impl std::fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Batch {} failed: {}", self.batch.id, self.message)
    }
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
        }
    }

    pub fn operation(
        batch_id: Option<String>,
        operation: Operation,
        error: Option<OperationError>,
        status_code: u16,
    ) -> Self {
        let entity_name = operation.entity_name().to_string();
        Error::Operation(Box::new(OperationFailure {
            batch_id,
            operation,
            entity_name,
            error,
            status_code,
            correlation_id: Uuid::new_v4(),
        }))
    }

    pub fn batch(message: impl Into<String>, batch: Batch) -> Self {
        Error::Batch(Box::new(BatchFailure {
            message: message.into(),
            batch,
            correlation_id: Uuid::new_v4(),
        }))
    }

    /// Whether the retry policy may resend after this error.
    ///
    /// Throttling dictates a server-suggested wait; transport failures are
    /// transient. Parse and validation errors will not self-correct on
    /// resend and are fatal for their batch.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Throttling { .. } => true,
            Error::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Server-suggested delay before the next attempt, when one was given.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Throttling { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
