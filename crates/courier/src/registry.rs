//! Pending call registry: correlation identifier → suspended caller.
//!
//! # Lifecycle
//!
//! ```text
//! Unregistered ── register ──► Registered ── complete ──► Resolved
//!                                   │ ────── fail ──────► Failed
//!                                   │ ───── error_out ──► Errored
//!                                   └────── discard ────► (dropped, caller sees Abandoned)
//! ```
//!
//! Every transition out of `Registered` starts with `DashMap::remove`. Only
//! the caller that removed the entry owns the resolver, so a call is resolved
//! at most once no matter how completions, failures and local errors race.
//! A transition on an identifier that is not registered returns
//! [`UnknownCorrelation`] and changes nothing.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::{DuplicateCorrelation, UnknownCorrelation, WorkflowError};
use crate::workflow::{WorkflowCompletion, WorkflowFailure};

/// What a suspended caller eventually receives.
pub type Resolution = Result<WorkflowCompletion, WorkflowError>;

/// Handle used to wake the suspended caller.
pub type Resolver = oneshot::Sender<Resolution>;

/// The registry's record of one outstanding call.
pub struct PendingCall {
    identifier: String,
    procedure: String,
    issued_at: DateTime<Utc>,
    cancelled: bool,
    resolver: Resolver,
}

impl PendingCall {
    fn resolve(self, resolution: Resolution) {
        let outcome = if resolution.is_ok() { "completed" } else { "failed" };
        if self.resolver.send(resolution).is_err() {
            if self.cancelled {
                tracing::debug!(
                    identifier = %self.identifier,
                    "cancelled call {outcome} after its caller left"
                );
                return;
            }
            tracing::warn!(
                identifier = %self.identifier,
                procedure = %self.procedure,
                "caller stopped waiting before the call was {outcome}"
            );
        } else {
            tracing::debug!(identifier = %self.identifier, outcome, "pending call resolved");
        }
    }

    fn snapshot(&self) -> OutstandingCall {
        OutstandingCall {
            identifier: self.identifier.clone(),
            procedure: self.procedure.clone(),
            issued_at: self.issued_at,
            cancelled: self.cancelled,
        }
    }
}

/// Diagnostic view of a registered call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutstandingCall {
    pub identifier: String,
    pub procedure: String,
    pub issued_at: DateTime<Utc>,
    /// The caller gave up and a cancellation notice went out.
    pub cancelled: bool,
}

/// Sole owner of the identifier → pending call mapping.
#[derive(Default)]
pub struct PendingCalls {
    calls: DashMap<String, PendingCall>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Unregistered → Registered`.
    pub fn register(
        &self,
        identifier: impl Into<String>,
        procedure: impl Into<String>,
        resolver: Resolver,
    ) -> Result<(), DuplicateCorrelation> {
        let identifier = identifier.into();
        match self.calls.entry(identifier.clone()) {
            Entry::Occupied(_) => Err(DuplicateCorrelation(identifier)),
            Entry::Vacant(slot) => {
                let procedure = procedure.into();
                tracing::debug!(identifier = %identifier, procedure = %procedure, "pending call registered");
                slot.insert(PendingCall {
                    identifier,
                    procedure,
                    issued_at: Utc::now(),
                    cancelled: false,
                    resolver,
                });
                Ok(())
            }
        }
    }

    /// Resolve the caller with the remote's result.
    pub fn complete(&self, completion: WorkflowCompletion) -> Result<(), UnknownCorrelation> {
        let call = self.take(&completion.identifier)?;
        call.resolve(Ok(completion));
        Ok(())
    }

    /// Resolve the caller with the error matching the remote's failure kind.
    pub fn fail(&self, failure: &WorkflowFailure) -> Result<(), UnknownCorrelation> {
        let call = self.take(&failure.identifier)?;
        call.resolve(Err(WorkflowError::from_failure(
            &failure.kind,
            failure.message.as_str(),
        )));
        Ok(())
    }

    /// Resolve the caller with a local error (nothing reached the remote, or
    /// the caller gave up waiting).
    pub fn error_out(&self, identifier: &str, error: WorkflowError) -> Result<(), UnknownCorrelation> {
        let call = self.take(identifier)?;
        call.resolve(Err(error));
        Ok(())
    }

    /// Forget a call without resolving it. A caller still waiting observes
    /// its resolver being dropped.
    pub fn discard(&self, identifier: &str) -> bool {
        let discarded = self.calls.remove(identifier).is_some();
        if discarded {
            tracing::debug!(identifier, "pending call discarded");
        }
        discarded
    }

    /// Note that the caller stopped waiting while the entry stays registered.
    /// The remote's eventual reply is then expected and resolved quietly.
    pub fn mark_cancelled(&self, identifier: &str) -> bool {
        match self.calls.get_mut(identifier) {
            Some(mut call) => {
                call.cancelled = true;
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, identifier: &str) -> bool {
        self.calls.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Snapshot of every registered call, oldest first.
    pub fn outstanding(&self) -> Vec<OutstandingCall> {
        let mut calls: Vec<_> = self.calls.iter().map(|entry| entry.snapshot()).collect();
        calls.sort_by_key(|call| call.issued_at);
        calls
    }

    fn take(&self, identifier: &str) -> Result<PendingCall, UnknownCorrelation> {
        self.calls
            .remove(identifier)
            .map(|(_, call)| call)
            .ok_or_else(|| UnknownCorrelation(identifier.to_string()))
    }
}
