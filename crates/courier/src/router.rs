//! Topic router: demultiplexes inbound messages, forwards outbound ones.
//!
//! ```text
//!                         ┌──────────── Router ────────────┐
//! Listener ── attach() ──►│ dispatch() ─► topics[topic] ───┼──► subscribe(topic)
//!                         │                  (fan-out)     │    decode_subscribe::<T>(topic)
//!                         │                                │
//!           send(topic) ──┼─► Codec::encode ─► Messenger ──┼──► other runtime
//!                         └────────────────────────────────┘
//! ```
//!
//! Each topic owns one fan-out stream, created on first subscription. Every
//! subscriber gets its own unbounded queue fed under the topic's lock, so all
//! live subscribers observe the same sequence of later messages in dispatch
//! order, and a slow subscriber buffers instead of losing messages.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use futures::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use crate::codec::{Codec, JsonCodec};
use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::listener::{receiver_stream, Listener, MessageStreamExt};
use crate::message::Message;
use crate::messenger::Messenger;

/// A wire type with a fixed topic. Implement with [`routed!`](crate::routed).
pub trait Routed {
    const TOPIC: &'static str;
}

struct RouterInner<C> {
    messenger: Box<dyn Messenger>,
    codec: C,
    topics: DashMap<String, Vec<mpsc::UnboundedSender<Message>>>,
    pumps: Mutex<Vec<AbortHandle>>,
    config: RouterConfig,
}

impl<C> Drop for RouterInner<C> {
    fn drop(&mut self) {
        let pumps = self.pumps.get_mut().unwrap_or_else(PoisonError::into_inner);
        for pump in pumps.drain(..) {
            pump.abort();
        }
    }
}

impl<C: Codec> RouterInner<C> {
    fn stream_for(&self, topic: &str) -> mpsc::UnboundedReceiver<Message> {
        let (sender, receiver) = mpsc::unbounded_channel();
        // Dispatch takes the same entry lock, so the new subscriber sees
        // exactly the messages dispatched after this point.
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| {
                tracing::debug!(topic, "topic stream created");
                Vec::new()
            })
            .push(sender);
        receiver
    }

    fn dispatch(&self, message: Message) -> bool {
        let receivers = {
            let Some(mut subscribers) = self.topics.get_mut(&message.topic) else {
                tracing::trace!(topic = %message.topic, "no stream for topic, message dropped");
                return false;
            };
            subscribers.retain(|subscriber| subscriber.send(message.clone()).is_ok());
            subscribers.len()
        };

        if receivers > 0 {
            tracing::debug!(topic = %message.topic, receivers, "message dispatched");
            return true;
        }

        tracing::trace!(topic = %message.topic, "no live subscribers, message dropped");
        if self.config.prune_idle_topics
            && self
                .topics
                .remove_if(&message.topic, |_, subscribers| subscribers.is_empty())
                .is_some()
        {
            tracing::debug!(topic = %message.topic, "idle topic stream pruned");
        }
        false
    }
}

/// Topic router over one shared notification channel.
///
/// Cheap to clone; clones share topics, messenger and codec. The router owns
/// no global state: whoever constructs it decides its lifetime.
pub struct Router<C: Codec = JsonCodec> {
    inner: Arc<RouterInner<C>>,
}

impl<C: Codec> Clone for Router<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Router<JsonCodec> {
    /// Router with the JSON codec and default settings.
    pub fn new(messenger: impl Messenger) -> Self {
        RouterBuilder::new(messenger).build()
    }

    pub fn builder(messenger: impl Messenger) -> RouterBuilder<JsonCodec> {
        RouterBuilder::new(messenger)
    }
}

impl<C: Codec> Router<C> {
    /// Stream of every message dispatched on `topic` from now on.
    ///
    /// The topic stream is created on first use. All handles for a topic
    /// share it.
    pub fn subscribe(&self, topic: &str) -> BoxStream<'static, Message> {
        receiver_stream(self.inner.stream_for(topic))
    }

    /// Like [`subscribe`](Self::subscribe), decoding each message into `T`.
    ///
    /// Malformed messages are logged and skipped; the stream stays open.
    pub fn decode_subscribe<T>(&self, topic: &str) -> BoxStream<'static, T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.subscribe(topic)
            .decode_content::<T, C>(self.inner.codec.clone())
    }

    pub fn subscribe_routed<T>(&self) -> BoxStream<'static, T>
    where
        T: Routed + DeserializeOwned + Send + 'static,
    {
        self.decode_subscribe(T::TOPIC)
    }

    /// Encode `value` and hand it to the messenger. No retries.
    pub fn send<T>(&self, topic: &str, value: &T) -> Result<(), RouterError>
    where
        T: Serialize + ?Sized,
    {
        let content = self.inner.codec.encode(value)?;
        tracing::debug!(topic, bytes = content.len(), "sending message");
        self.inner.messenger.send(topic, content)?;
        Ok(())
    }

    pub fn send_routed<T>(&self, value: &T) -> Result<(), RouterError>
    where
        T: Routed + Serialize,
    {
        self.send(T::TOPIC, value)
    }

    /// Publish an inbound message to its topic stream.
    ///
    /// Returns `false` when nobody is subscribed to the topic; the message is
    /// dropped. That is expected, not an error.
    pub fn dispatch(&self, message: Message) -> bool {
        self.inner.dispatch(message)
    }

    /// Feed every message from `listener` into [`dispatch`](Self::dispatch).
    ///
    /// The pump task only holds a weak reference and is aborted once the last
    /// router handle is dropped. Must be called inside a tokio runtime.
    pub fn attach<L>(&self, listener: &L) -> JoinHandle<()>
    where
        L: Listener + ?Sized,
    {
        let mut messages = listener.messages();
        let router = Arc::downgrade(&self.inner);
        let pump = tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                let Some(inner) = router.upgrade() else {
                    break;
                };
                inner.dispatch(message);
            }
            tracing::debug!("listener pump stopped");
        });
        self.inner
            .pumps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pump.abort_handle());
        pump
    }

    /// Tear down a topic stream. Existing subscribers see end of stream.
    pub fn close_topic(&self, topic: &str) -> bool {
        self.inner.topics.remove(topic).is_some()
    }

    /// Topics that currently have a stream.
    pub fn topics(&self) -> Vec<String> {
        self.inner
            .topics
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn codec(&self) -> &C {
        &self.inner.codec
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Router`].
pub struct RouterBuilder<C = JsonCodec> {
    messenger: Box<dyn Messenger>,
    codec: C,
    config: RouterConfig,
}

impl RouterBuilder<JsonCodec> {
    pub fn new(messenger: impl Messenger) -> Self {
        Self {
            messenger: Box::new(messenger),
            codec: JsonCodec,
            config: RouterConfig::default(),
        }
    }
}

impl<C: Codec> RouterBuilder<C> {
    pub fn with_codec<C2: Codec>(self, codec: C2) -> RouterBuilder<C2> {
        RouterBuilder {
            messenger: self.messenger,
            codec,
            config: self.config,
        }
    }

    pub fn with_idle_topic_pruning(mut self, prune: bool) -> Self {
        self.config.prune_idle_topics = prune;
        self
    }

    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Router<C> {
        Router {
            inner: Arc::new(RouterInner {
                messenger: self.messenger,
                codec: self.codec,
                topics: DashMap::new(),
                pumps: Mutex::new(Vec::new()),
                config: self.config,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CodecError, TransportError};
    use crate::listener::BroadcastListener;
    use crate::test_support::{capture, text};
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        celsius: i32,
    }

    crate::routed!(Reading => "sensor.reading");

    #[tokio::test]
    async fn test_subscribers_share_one_stream() {
        let (messenger, _sent) = capture();
        let router = Router::new(messenger);

        let mut first = router.subscribe("chat");
        let mut second = router.subscribe("chat");
        assert_eq!(router.topics(), vec!["chat".to_string()]);

        for n in 0..3 {
            assert!(router.dispatch(text("chat", &n.to_string())));
        }

        for n in 0..3 {
            assert_eq!(first.next().await.unwrap().content, n.to_string().into_bytes());
            assert_eq!(second.next().await.unwrap().content, n.to_string().into_bytes());
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_later_messages() {
        let (messenger, _sent) = capture();
        let router = Router::new(messenger);

        let mut early = router.subscribe("chat");
        router.dispatch(text("chat", "before"));
        let mut late = router.subscribe("chat");
        router.dispatch(text("chat", "after"));

        assert_eq!(early.next().await.unwrap().content, b"before");
        assert_eq!(early.next().await.unwrap().content, b"after");
        assert_eq!(late.next().await.unwrap().content, b"after");
    }

    #[tokio::test]
    async fn test_dispatch_without_subscriber_is_dropped() {
        let (messenger, _sent) = capture();
        let router = Router::new(messenger);

        assert!(!router.dispatch(text("nobody", "hello")));
        assert!(router.topics().is_empty());
    }

    #[tokio::test]
    async fn test_idle_topic_is_pruned() {
        let (messenger, _sent) = capture();
        let router = Router::new(messenger);

        drop(router.subscribe("chat"));
        assert_eq!(router.topics().len(), 1);

        assert!(!router.dispatch(text("chat", "hello")));
        assert!(router.topics().is_empty());
    }

    #[tokio::test]
    async fn test_idle_topic_kept_when_pruning_disabled() {
        let (messenger, _sent) = capture();
        let router = Router::builder(messenger)
            .with_idle_topic_pruning(false)
            .build();

        drop(router.subscribe("chat"));
        assert!(!router.dispatch(text("chat", "hello")));
        assert_eq!(router.topics(), vec!["chat".to_string()]);
    }

    #[tokio::test]
    async fn test_close_topic_ends_streams() {
        let (messenger, _sent) = capture();
        let router = Router::new(messenger);

        let mut stream = router.subscribe("chat");
        assert!(router.close_topic("chat"));
        assert!(stream.next().await.is_none());
        assert!(!router.close_topic("chat"));
    }

    #[tokio::test]
    async fn test_malformed_message_is_isolated() {
        let (messenger, _sent) = capture();
        let router = Router::new(messenger);

        let mut readings = router.decode_subscribe::<Reading>("sensor.reading");
        let mut other = router.decode_subscribe::<Reading>("sensor.backup");

        router.dispatch(text("sensor.reading", "{not json"));
        router.dispatch(text("sensor.reading", r#"{"celsius":21}"#));
        router.dispatch(text("sensor.backup", r#"{"celsius":19}"#));

        assert_eq!(readings.next().await, Some(Reading { celsius: 21 }));
        assert_eq!(other.next().await, Some(Reading { celsius: 19 }));
    }

    #[tokio::test]
    async fn test_send_encodes_and_forwards() {
        let (messenger, mut sent) = capture();
        let router = Router::new(messenger);

        router.send_routed(&Reading { celsius: 4 }).unwrap();

        let message = sent.recv().await.unwrap();
        assert_eq!(message.topic, "sensor.reading");
        assert_eq!(message.content, br#"{"celsius":4}"#);
    }

    #[tokio::test]
    async fn test_send_surfaces_transport_error() {
        let (messenger, _sent) = capture();
        messenger.fail_with(TransportError::Closed);
        let router = Router::new(messenger);

        assert_eq!(
            router.send("chat", "hello"),
            Err(RouterError::Transport(TransportError::Closed))
        );
    }

    #[tokio::test]
    async fn test_send_surfaces_encode_error_without_sending() {
        let (messenger, mut sent) = capture();
        let router = Router::new(messenger);

        let mut unencodable = BTreeMap::new();
        unencodable.insert(vec![1u8], 1u8);

        assert!(matches!(
            router.send("chat", &unencodable),
            Err(RouterError::Codec(CodecError::Encode { .. }))
        ));
        assert!(sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_attached_listener_feeds_router() {
        let (messenger, _sent) = capture();
        let router = Router::new(messenger);
        let listener = BroadcastListener::new();

        let mut readings = router.subscribe_routed::<Reading>();
        let pump = router.attach(&listener);

        listener.broadcast(text("sensor.reading", r#"{"celsius":30}"#));

        let reading = tokio::time::timeout(Duration::from_secs(1), readings.next())
            .await
            .unwrap();
        assert_eq!(reading, Some(Reading { celsius: 30 }));

        drop(router);
        drop(readings);
        let stopped = tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .unwrap();
        assert!(stopped.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_pump_stops_with_router_while_listener_is_quiet() {
        let (messenger, _sent) = capture();
        let router = Router::new(messenger);
        let listener = BroadcastListener::new();

        let pump = router.attach(&listener);
        assert_eq!(listener.stream_count(), 1);
        drop(router);

        let stopped = tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .unwrap();
        assert!(stopped.unwrap_err().is_cancelled());
        assert_eq!(listener.stream_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_misses_nothing() {
        let (messenger, _sent) = capture();
        let router = Router::new(messenger);
        let stream = router.subscribe("ticks");

        for tick in 0..5000 {
            assert!(router.dispatch(text("ticks", &tick.to_string())));
        }
        router.close_topic("ticks");

        let seen: Vec<String> = stream
            .map(|message| message.content_lossy().into_owned())
            .collect()
            .await;
        assert_eq!(seen, (0..5000).map(|tick: i32| tick.to_string()).collect::<Vec<_>>());
    }
}
