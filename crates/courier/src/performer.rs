//! Workflow performer: typed remote calls over the router.
//!
//! # Call flow
//!
//! ```text
//! perform(procedure, payload)
//!   1. identifier = fresh UUID
//!   2. PendingCalls::register(identifier)        ◄── before anything is sent
//!   3. encode payload          ── fails ──► error_out(Encode)
//!   4. send workflow.request   ── fails ──► error_out(Transport)
//!   5. await resolver
//!         ▲
//!         │  standing subscriptions (spawned at construction)
//!         ├── workflow.completion ─► PendingCalls::complete
//!         └── workflow.failure    ─► PendingCalls::fail
//!   6. decode result           ── fails ──► Decode
//! ```
//!
//! # Cancellation
//!
//! Dropping the `perform` future while it waits is cancellation. A best-effort
//! `workflow.cancellation` notice is sent; what happens to the registry entry
//! is governed by [`CancellationPolicy`].

use std::sync::Arc;

use futures::stream::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::codec::{encode_text, Codec, JsonCodec};
use crate::config::{CancellationPolicy, PerformerConfig};
use crate::error::WorkflowError;
use crate::registry::{PendingCalls, Resolution};
use crate::router::Router;
use crate::workflow::{WorkflowCancellation, WorkflowCompletion, WorkflowFailure, WorkflowRequest};

/// Public call surface for remote procedures.
///
/// Cheap to clone; clones share the registry and standing subscriptions,
/// which live until the last clone is dropped.
pub struct Performer<C: Codec = JsonCodec> {
    inner: Arc<PerformerInner<C>>,
}

impl<C: Codec> Clone for Performer<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PerformerInner<C: Codec> {
    router: Router<C>,
    calls: Arc<PendingCalls>,
    config: PerformerConfig,
    _subscriptions: Subscriptions,
}

/// Standing subscription tasks, aborted with their owner.
struct Subscriptions(Vec<JoinHandle<()>>);

impl Drop for Subscriptions {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

impl<C: Codec> Performer<C> {
    /// Performer with default settings. Must be called inside a tokio runtime.
    pub fn new(router: Router<C>) -> Self {
        PerformerBuilder::new(router).build()
    }

    pub fn builder(router: Router<C>) -> PerformerBuilder<C> {
        PerformerBuilder::new(router)
    }

    /// Call `procedure` on the remote side and wait for its result.
    ///
    /// Remote failures surface as [`WorkflowError::InvalidProcedure`],
    /// [`WorkflowError::Cancelled`] or [`WorkflowError::Runtime`]; failures on
    /// this side never leave the caller waiting.
    pub async fn perform<P, R>(&self, procedure: &str, payload: &P) -> Result<R, WorkflowError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let completion = self.inner.call(procedure, payload).await?;
        self.inner
            .router
            .codec()
            .decode::<R>(completion.result.as_bytes())
            .map_err(WorkflowError::Decode)
    }

    pub fn pending_calls(&self) -> &PendingCalls {
        &self.inner.calls
    }

    pub fn router(&self) -> &Router<C> {
        &self.inner.router
    }

    pub fn config(&self) -> &PerformerConfig {
        &self.inner.config
    }
}

impl<C: Codec> PerformerInner<C> {
    async fn call<P>(&self, procedure: &str, payload: &P) -> Resolution
    where
        P: Serialize + ?Sized,
    {
        let identifier = Uuid::new_v4().to_string();
        let (resolver, mut resolution) = oneshot::channel();

        // Registered before the request exists, so no reply can outrun it.
        self.calls.register(identifier.as_str(), procedure, resolver)?;

        if let Err(error) = self.send_request(&identifier, procedure, payload) {
            tracing::debug!(identifier = %identifier, procedure, %error, "workflow request not sent");
            self.error_out(&identifier, error);
            return settle(resolution.await);
        }

        let mut guard = CancelOnDrop {
            performer: self,
            identifier: &identifier,
            armed: true,
        };

        let outcome = match self.config.call_timeout {
            None => resolution.await,
            Some(limit) => match tokio::time::timeout(limit, &mut resolution).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    // A reply that raced the deadline wins; error_out is then a no-op.
                    if self
                        .calls
                        .error_out(&identifier, WorkflowError::Timeout(limit))
                        .is_ok()
                    {
                        tracing::debug!(identifier = %identifier, procedure, ?limit, "workflow timed out");
                        self.notify_cancellation(&identifier);
                    }
                    resolution.await
                }
            },
        };

        guard.armed = false;
        settle(outcome)
    }

    fn send_request<P>(&self, identifier: &str, procedure: &str, payload: &P) -> Result<(), WorkflowError>
    where
        P: Serialize + ?Sized,
    {
        let payload = encode_text(self.router.codec(), payload).map_err(WorkflowError::Encode)?;
        let request = WorkflowRequest {
            identifier: identifier.to_string(),
            procedure: procedure.to_string(),
            payload,
        };
        self.router.send_routed(&request)?;
        Ok(())
    }

    fn error_out(&self, identifier: &str, error: WorkflowError) {
        if let Err(unknown) = self.calls.error_out(identifier, error) {
            tracing::warn!(%unknown, "local error for a call that is no longer pending");
        }
    }

    fn notify_cancellation(&self, identifier: &str) {
        let notice = WorkflowCancellation {
            identifier: identifier.to_string(),
        };
        if let Err(error) = self.router.send_routed(&notice) {
            tracing::warn!(identifier, %error, "cancellation notice not sent");
        }
    }
}

fn settle(outcome: Result<Resolution, oneshot::error::RecvError>) -> Resolution {
    outcome.unwrap_or(Err(WorkflowError::Abandoned))
}

/// Sends the cancellation notice if the waiting call is dropped.
struct CancelOnDrop<'a, C: Codec> {
    performer: &'a PerformerInner<C>,
    identifier: &'a str,
    armed: bool,
}

impl<C: Codec> Drop for CancelOnDrop<'_, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!(identifier = self.identifier, "workflow caller went away, cancelling");
        match self.performer.config.cancellation {
            CancellationPolicy::ResolveLocally => {
                self.performer.calls.discard(self.identifier);
            }
            CancellationPolicy::AwaitRemote => {
                self.performer.calls.mark_cancelled(self.identifier);
            }
        }
        self.performer.notify_cancellation(self.identifier);
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Performer`].
pub struct PerformerBuilder<C: Codec = JsonCodec> {
    router: Router<C>,
    config: PerformerConfig,
}

impl<C: Codec> PerformerBuilder<C> {
    pub fn new(router: Router<C>) -> Self {
        Self {
            router,
            config: PerformerConfig::default(),
        }
    }

    pub fn with_call_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.call_timeout = Some(timeout);
        self
    }

    pub fn with_cancellation_policy(mut self, policy: CancellationPolicy) -> Self {
        self.config.cancellation = policy;
        self
    }

    pub fn with_config(mut self, config: PerformerConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscribe to completions and failures and start the standing tasks.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Performer<C> {
        let calls = Arc::new(PendingCalls::new());

        let mut completions = self.router.subscribe_routed::<WorkflowCompletion>();
        let completion_calls = Arc::clone(&calls);
        let completion_task = tokio::spawn(async move {
            while let Some(completion) = completions.next().await {
                if let Err(unknown) = completion_calls.complete(completion) {
                    tracing::warn!(%unknown, "completion ignored");
                }
            }
        });

        let mut failures = self.router.subscribe_routed::<WorkflowFailure>();
        let failure_calls = Arc::clone(&calls);
        let failure_task = tokio::spawn(async move {
            while let Some(failure) = failures.next().await {
                if let Err(unknown) = failure_calls.fail(&failure) {
                    tracing::warn!(%unknown, kind = %failure.kind, "failure ignored");
                }
            }
        });

        Performer {
            inner: Arc::new(PerformerInner {
                router: self.router,
                calls,
                config: self.config,
                _subscriptions: Subscriptions(vec![completion_task, failure_task]),
            }),
        }
    }
}
