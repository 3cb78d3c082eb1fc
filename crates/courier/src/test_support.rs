//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::message::Message;
use crate::messenger::Messenger;
use crate::workflow::{WorkflowRequest, REQUEST_TOPIC};

/// Messenger that forwards everything it is given to a test-held receiver.
#[derive(Clone)]
pub(crate) struct CapturingMessenger {
    sent: mpsc::UnboundedSender<Message>,
    failure: Arc<Mutex<Option<TransportError>>>,
}

impl CapturingMessenger {
    /// Fail every subsequent send with `error`.
    pub(crate) fn fail_with(&self, error: TransportError) {
        *self.failure.lock().unwrap() = Some(error);
    }
}

impl Messenger for CapturingMessenger {
    fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.sent
            .send(Message::new(topic, payload))
            .map_err(|_| TransportError::Closed)
    }
}

pub(crate) fn capture() -> (CapturingMessenger, mpsc::UnboundedReceiver<Message>) {
    let (sent, received) = mpsc::unbounded_channel();
    let messenger = CapturingMessenger {
        sent,
        failure: Arc::new(Mutex::new(None)),
    };
    (messenger, received)
}

pub(crate) fn text(topic: &str, content: &str) -> Message {
    Message::new(topic, content.as_bytes().to_vec())
}

pub(crate) fn json<T: Serialize>(topic: &str, value: &T) -> Message {
    Message::new(topic, serde_json::to_vec(value).unwrap())
}

/// Next captured message on `topic`, decoded. Other topics are skipped.
pub(crate) async fn next_on<T: DeserializeOwned>(
    sent: &mut mpsc::UnboundedReceiver<Message>,
    topic: &str,
) -> T {
    loop {
        let message = sent.recv().await.expect("messenger dropped");
        if message.topic == topic {
            return serde_json::from_slice(&message.content).unwrap();
        }
    }
}

pub(crate) async fn next_request(sent: &mut mpsc::UnboundedReceiver<Message>) -> WorkflowRequest {
    next_on(sent, REQUEST_TOPIC).await
}
