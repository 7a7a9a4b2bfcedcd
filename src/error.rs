use thiserror::Error;

use crate::{Capability, DeviceId};

/// Error taxonomy for all translator operations.
///
/// Per-device and per-capability errors (`Schema`, `MalformedEvent`) are
/// reported for the item they concern and never abort processing of sibling
/// devices or capabilities.
#[derive(Debug, Clone, Error)]
pub enum SmartThingsError {
    /// Credentials were rejected. Terminal until the session is reauthenticated.
    #[error("Authentication with the SmartThings API failed: {0}")]
    Auth(String),
    /// The remote could not be reached, timed out or asked us to back off.
    #[error("SmartThings API temporarily unavailable: {0}")]
    TransientNetwork(String),
    #[error("Capability payload does not match a known schema: {capability} ({reason})")]
    Schema { capability: String, reason: String },
    #[error("Malformed event for device [{device}] {capability}.{attribute}: {reason}")]
    MalformedEvent {
        device: DeviceId,
        capability: Capability,
        attribute: String,
        reason: String,
    },
    /// Command parameters failed local validation. No request was sent.
    #[error("Command validation failed: {0}")]
    Validation(String),
    #[error("Command rejected by SmartThings: {0}")]
    CommandRejected(String),
    #[error("Unknown device: {0}")]
    UnknownDevice(DeviceId),
    #[error("SmartThings API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Error decoding SmartThings payload: {0}")]
    Decode(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Session has been closed")]
    SessionClosed,
    #[error("Translator channel is closed.")]
    ChannelClosed,
    #[error("Error waiting for translator task to complete: {0}")]
    Worker(String),
}

impl SmartThingsError {
    /// Returns true if the operation may succeed when retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SmartThingsError::TransientNetwork(_))
    }

    /// Returns true if no retry will succeed without outside intervention
    /// (new credentials or a new session).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SmartThingsError::Auth(_) | SmartThingsError::SessionClosed
        )
    }

    pub(crate) fn schema(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        SmartThingsError::Schema {
            capability: capability.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for SmartThingsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SmartThingsError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Worker(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for SmartThingsError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::TransientNetwork(format!("request timed out: {err}"))
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for SmartThingsError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for SmartThingsError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::ChannelClosed
    }
}

pub type SmartThingsResult<T> = Result<T, SmartThingsError>;
