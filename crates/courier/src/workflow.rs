//! Wire shapes of the workflow protocol.
//!
//! ```text
//! workflow.request       identifier, procedure, payload
//! workflow.completion    identifier, result
//! workflow.failure       identifier, kind, message
//! workflow.cancellation  identifier
//! ```
//!
//! `payload` and `result` are opaque: the codec's output for the caller's
//! value, carried as text inside the envelope.

use serde::{Deserialize, Serialize};

use crate::routed;

pub const REQUEST_TOPIC: &str = "workflow.request";
pub const COMPLETION_TOPIC: &str = "workflow.completion";
pub const FAILURE_TOPIC: &str = "workflow.failure";
pub const CANCELLATION_TOPIC: &str = "workflow.cancellation";

/// An outgoing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub identifier: String,
    pub procedure: String,
    pub payload: String,
}

/// Successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowCompletion {
    pub identifier: String,
    pub result: String,
}

/// Unsuccessful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowFailure {
    pub identifier: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Best-effort notice that the caller stopped waiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowCancellation {
    pub identifier: String,
}

routed!(
    WorkflowRequest => REQUEST_TOPIC,
    WorkflowCompletion => COMPLETION_TOPIC,
    WorkflowFailure => FAILURE_TOPIC,
    WorkflowCancellation => CANCELLATION_TOPIC,
);

/// Why the remote rejected a call.
///
/// Serialized as a bare string. Kinds this side does not know about are kept
/// verbatim in `Other` so they can be surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FailureKind {
    InvalidProcedure,
    Cancelled,
    Other(String),
}

impl FailureKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidProcedure => "InvalidProcedure",
            Self::Cancelled => "Cancelled",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for FailureKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "InvalidProcedure" => Self::InvalidProcedure,
            "Cancelled" => Self::Cancelled,
            _ => Self::Other(kind),
        }
    }
}

impl From<FailureKind> for String {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WorkflowFailure {
    pub fn new(identifier: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            message: message.into(),
        }
    }
}
