//! In-process stand-in for the physical channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use courier::{BroadcastListener, Message, Messenger, Router, TransportError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Notify;

/// Messenger that records everything it sends and republishes it on an
/// outbound [`BroadcastListener`] for fakes to consume.
#[derive(Clone, Default)]
pub struct RecordingMessenger {
    sent: Arc<Mutex<Vec<Message>>>,
    failure: Arc<Mutex<Option<TransportError>>>,
    notify: Arc<Notify>,
    outbound: BroadcastListener,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages sent on `topic`, decoded as JSON.
    pub fn sent_on<T: DeserializeOwned>(&self, topic: &str) -> Result<Vec<T>> {
        self.sent()
            .into_iter()
            .filter(|message| message.topic == topic)
            .map(|message| {
                serde_json::from_slice(&message.content)
                    .with_context(|| format!("decoding message sent on {topic}"))
            })
            .collect()
    }

    /// Wait until at least `count` messages were sent on `topic`, then return
    /// them decoded.
    pub async fn wait_for_sent<T: DeserializeOwned>(
        &self,
        topic: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<T>> {
        match tokio::time::timeout(timeout, self.wait_until_sent::<T>(topic, count)).await {
            Ok(found) => found,
            Err(_) => bail!("fewer than {count} messages sent on {topic} within {timeout:?}"),
        }
    }

    async fn wait_until_sent<T: DeserializeOwned>(&self, topic: &str, count: usize) -> Result<Vec<T>> {
        loop {
            // Registered before checking, so a send in between still wakes us.
            let notified = self.notify.notified();
            let found = self.sent_on::<T>(topic)?;
            if found.len() >= count {
                return Ok(found);
            }
            notified.await;
        }
    }

    /// Stream of future sends, for fakes of the other runtime.
    pub fn outbound(&self) -> &BroadcastListener {
        &self.outbound
    }

    /// Fail every subsequent send with `error`.
    pub fn fail_with(&self, error: TransportError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }
}

impl Messenger for RecordingMessenger {
    fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        let message = Message::new(topic, payload);
        self.sent.lock().unwrap().push(message.clone());
        self.outbound.broadcast(message);
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Both halves of an in-process channel.
///
/// Outbound: whatever a router sends lands in the [`RecordingMessenger`].
/// Inbound: whatever is [`inject`](Self::inject)ed is delivered through the
/// [`BroadcastListener`] to every attached router.
#[derive(Clone, Default)]
pub struct LoopbackChannel {
    messenger: RecordingMessenger,
    listener: BroadcastListener,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messenger(&self) -> &RecordingMessenger {
        &self.messenger
    }

    pub fn listener(&self) -> &BroadcastListener {
        &self.listener
    }

    /// A JSON router wired to this channel. Must be called inside a tokio runtime.
    pub fn router(&self) -> Router {
        let router = Router::new(self.messenger.clone());
        // The router aborts its pump when dropped.
        let _ = router.attach(&self.listener);
        router
    }

    /// Deliver `value` as an inbound message on `topic`.
    pub fn inject<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> Result<usize> {
        let content = serde_json::to_vec(value).context("encoding injected message")?;
        Ok(self.listener.broadcast(Message::new(topic, content)))
    }

    /// Deliver raw bytes as an inbound message on `topic`.
    pub fn inject_raw(&self, topic: &str, content: impl Into<Vec<u8>>) -> usize {
        self.listener.broadcast(Message::new(topic, content))
    }
}
