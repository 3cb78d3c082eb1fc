//! Scriptable fake of the other runtime.
//!
//! Reads requests and cancellations from a [`LoopbackChannel`]'s outbound
//! side, runs the matching [`RemoteProcedure`], and posts completions and
//! failures back on the inbound side, the way the real remote executor would.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier::workflow::{CANCELLATION_TOPIC, COMPLETION_TOPIC, FAILURE_TOPIC, REQUEST_TOPIC};
use courier::{
    BroadcastListener, FailureKind, Listener, Message, WorkflowCancellation, WorkflowCompletion,
    WorkflowFailure, WorkflowRequest,
};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::task::{AbortHandle, JoinHandle};

use crate::loopback::LoopbackChannel;

/// A procedure the fake remote can execute.
#[async_trait]
pub trait RemoteProcedure: Send + Sync + 'static {
    async fn call(&self, payload: Value) -> Result<Value, RemoteFailure>;
}

/// Failure reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RemoteFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::from(kind.into()),
            message: message.into(),
        }
    }
}

/// Adapts an async closure into a [`RemoteProcedure`].
pub struct FnProcedure<F>(F);

#[async_trait]
impl<F, Fut> RemoteProcedure for FnProcedure<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RemoteFailure>> + Send + 'static,
{
    async fn call(&self, payload: Value) -> Result<Value, RemoteFailure> {
        (self.0)(payload).await
    }
}

type Running = Arc<Mutex<HashMap<String, AbortHandle>>>;

/// In-process remote executor.
///
/// Unknown procedures are answered with `InvalidProcedure`. Cancellation
/// notices abort the running procedure and, when acknowledging, answer with a
/// `Cancelled` failure.
pub struct FakeRemote {
    procedures: HashMap<String, Arc<dyn RemoteProcedure>>,
    acknowledge_cancellations: bool,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self {
            procedures: HashMap::new(),
            acknowledge_cancellations: true,
        }
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_procedure(mut self, name: impl Into<String>, procedure: impl RemoteProcedure) -> Self {
        self.procedures.insert(name.into(), Arc::new(procedure));
        self
    }

    pub fn with_fn<F, Fut>(self, name: impl Into<String>, procedure: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RemoteFailure>> + Send + 'static,
    {
        self.with_procedure(name, FnProcedure(procedure))
    }

    /// When `false`, cancellation notices are ignored entirely: the procedure
    /// keeps running and its result is still posted.
    pub fn acknowledging_cancellations(mut self, acknowledge: bool) -> Self {
        self.acknowledge_cancellations = acknowledge;
        self
    }

    /// Start serving `channel`. Must be called inside a tokio runtime.
    pub fn serve(self, channel: &LoopbackChannel) -> JoinHandle<()> {
        let mut outbound = channel.messenger().outbound().messages();
        let inbound = channel.listener().clone();
        let remote = Arc::new(self);
        let running: Running = Arc::default();

        tokio::spawn(async move {
            while let Some(message) = outbound.next().await {
                match message.topic.as_str() {
                    REQUEST_TOPIC => remote.start(&message, &inbound, &running),
                    CANCELLATION_TOPIC => remote.cancel(&message, &inbound, &running),
                    _ => {}
                }
            }
        })
    }

    fn start(&self, message: &Message, inbound: &BroadcastListener, running: &Running) {
        let request: WorkflowRequest = match serde_json::from_slice(&message.content) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(%error, "fake remote received a malformed request");
                return;
            }
        };

        let Some(procedure) = self.procedures.get(&request.procedure).cloned() else {
            post(
                inbound,
                FAILURE_TOPIC,
                &WorkflowFailure::new(
                    request.identifier,
                    FailureKind::InvalidProcedure,
                    format!("no such procedure: {}", request.procedure),
                ),
            );
            return;
        };

        let inbound = inbound.clone();
        let finished = Arc::clone(running);
        let identifier = request.identifier.clone();

        // Held across spawn and insert so the task cannot deregister first.
        let mut running = running.lock().unwrap();
        let task = tokio::spawn(async move {
            let outcome = match serde_json::from_str(&request.payload) {
                Ok(payload) => procedure.call(payload).await,
                Err(error) => Err(RemoteFailure::new("InvalidPayload", error.to_string())),
            };
            finished.lock().unwrap().remove(&request.identifier);

            match outcome {
                Ok(result) => post(
                    &inbound,
                    COMPLETION_TOPIC,
                    &WorkflowCompletion {
                        identifier: request.identifier,
                        result: result.to_string(),
                    },
                ),
                Err(failure) => post(
                    &inbound,
                    FAILURE_TOPIC,
                    &WorkflowFailure::new(request.identifier, failure.kind, failure.message),
                ),
            }
        });
        running.insert(identifier, task.abort_handle());
    }

    fn cancel(&self, message: &Message, inbound: &BroadcastListener, running: &Running) {
        let notice: WorkflowCancellation = match serde_json::from_slice(&message.content) {
            Ok(notice) => notice,
            Err(error) => {
                tracing::warn!(%error, "fake remote received a malformed cancellation");
                return;
            }
        };

        if !self.acknowledge_cancellations {
            tracing::debug!(identifier = %notice.identifier, "fake remote ignoring cancellation");
            return;
        }

        let task = running.lock().unwrap().remove(&notice.identifier);
        match task {
            Some(task) => {
                task.abort();
                post(
                    inbound,
                    FAILURE_TOPIC,
                    &WorkflowFailure::new(notice.identifier, FailureKind::Cancelled, "cancelled"),
                );
            }
            None => {
                tracing::debug!(identifier = %notice.identifier, "cancellation for a call that is not running");
            }
        }
    }
}

fn post<T: Serialize>(inbound: &BroadcastListener, topic: &str, value: &T) {
    match serde_json::to_vec(value) {
        Ok(content) => {
            inbound.broadcast(Message::new(topic, content));
        }
        Err(error) => tracing::warn!(topic, %error, "fake remote could not encode reply"),
    }
}
