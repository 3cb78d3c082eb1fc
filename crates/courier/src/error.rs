//! Error types for courier.
//!
//! Errors are split by where they arise:
//!
//! - [`TransportError`] / [`CodecError`] are purely local and are always routed
//!   back to the caller that triggered them.
//! - [`UnknownCorrelation`] / [`DuplicateCorrelation`] are registry anomalies.
//!   They have no waiting caller and are only ever logged by the core.
//! - [`WorkflowError`] is what a caller of `perform` sees, whether the failure
//!   was local or reported by the remote side.

use std::time::Duration;
use thiserror::Error;

use crate::workflow::FailureKind;

/// The Messenger could not hand a message to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("transport rejected message: {reason}")]
    Rejected { reason: String },
}

impl TransportError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// A value could not be (de)serialized by the [`Codec`](crate::Codec).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("failed to encode {type_name}: {reason}")]
    Encode {
        type_name: &'static str,
        reason: String,
    },

    #[error("failed to decode {type_name}: {reason}")]
    Decode {
        type_name: &'static str,
        reason: String,
    },
}

impl CodecError {
    pub fn encode<T: ?Sized>(reason: impl ToString) -> Self {
        Self::Encode {
            type_name: std::any::type_name::<T>(),
            reason: reason.to_string(),
        }
    }

    pub fn decode<T: ?Sized>(reason: impl ToString) -> Self {
        Self::Decode {
            type_name: std::any::type_name::<T>(),
            reason: reason.to_string(),
        }
    }
}

/// Failure of [`Router::send`](crate::Router::send).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A completion, failure or local error targeted an identifier that has no
/// registered pending call (late duplicate, or already resolved elsewhere).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no pending call registered for correlation {0}")]
pub struct UnknownCorrelation(pub String);

/// A pending call was registered twice under the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("a pending call is already registered for correlation {0}")]
pub struct DuplicateCorrelation(pub String);

/// Error returned to a caller of [`Performer::perform`](crate::Performer::perform).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The payload could not be serialized; nothing was sent.
    #[error("workflow payload could not be encoded: {0}")]
    Encode(CodecError),

    /// The completion arrived but its result did not match the expected type.
    #[error("workflow result could not be decoded: {0}")]
    Decode(CodecError),

    /// The request could not be handed to the Messenger.
    #[error("workflow request could not be sent: {0}")]
    Transport(#[from] TransportError),

    /// The remote does not know the requested procedure.
    #[error("invalid procedure: {0}")]
    InvalidProcedure(String),

    /// The remote acknowledged cancellation of the call.
    #[error("workflow cancelled")]
    Cancelled,

    /// Any other failure reported by the remote, passed through verbatim.
    #[error("workflow failed ({kind}): {message}")]
    Runtime { kind: String, message: String },

    /// No reply arrived within the configured call timeout.
    #[error("workflow timed out after {0:?}")]
    Timeout(Duration),

    /// The pending call was dropped without being resolved.
    #[error("workflow abandoned before a reply arrived")]
    Abandoned,

    #[error(transparent)]
    DuplicateCorrelation(#[from] DuplicateCorrelation),
}

impl From<RouterError> for WorkflowError {
    fn from(error: RouterError) -> Self {
        match error {
            RouterError::Codec(error) => Self::Encode(error),
            RouterError::Transport(error) => Self::Transport(error),
        }
    }
}

impl WorkflowError {
    /// Map a remote-reported failure onto the caller-facing error.
    pub fn from_failure(kind: &FailureKind, message: impl Into<String>) -> Self {
        match kind {
            FailureKind::InvalidProcedure => Self::InvalidProcedure(message.into()),
            FailureKind::Cancelled => Self::Cancelled,
            FailureKind::Other(kind) => Self::Runtime {
                kind: kind.clone(),
                message: message.into(),
            },
        }
    }

    /// True for failures reported by the remote side.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::InvalidProcedure(_) | Self::Cancelled | Self::Runtime { .. }
        )
    }

    /// True for failures that arose on this side of the channel.
    pub fn is_local(&self) -> bool {
        !self.is_remote()
    }
}
