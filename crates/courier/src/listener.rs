//! Inbound half of the channel.
//!
//! A [`Listener`] yields every message the other runtime posts, on all topics,
//! in no particular cross-topic order. The [`Router`](crate::Router) consumes
//! it through [`Router::attach`](crate::Router::attach); the stream helpers in
//! [`MessageStreamExt`] work on any raw message stream directly.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::codec::Codec;
use crate::message::Message;

/// Produces the never-ending, multi-subscriber sequence of inbound messages.
///
/// Every call to `messages` returns an independent stream that observes all
/// messages delivered after the call.
pub trait Listener: Send + Sync {
    fn messages(&self) -> BoxStream<'static, Message>;
}

/// In-process [`Listener`] fed by calling [`broadcast`](Self::broadcast).
///
/// Whatever actually receives bytes from the other runtime (a socket reader,
/// an FFI callback, a test) pushes them in here. Each stream is unbounded: a
/// slow reader buffers, it never loses messages.
#[derive(Debug, Clone, Default)]
pub struct BroadcastListener {
    streams: Arc<Mutex<Vec<mpsc::UnboundedSender<Message>>>>,
}

impl BroadcastListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fan `message` out to every live stream. Returns how many streams got it.
    pub fn broadcast(&self, message: Message) -> usize {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        // Closed streams are dropped here; the lock keeps every stream in the
        // same order.
        streams.retain(|stream| stream.send(message.clone()).is_ok());
        if streams.is_empty() {
            tracing::trace!(topic = %message.topic, "no listener streams, message dropped");
        }
        streams.len()
    }

    pub fn stream_count(&self) -> usize {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams.retain(|stream| !stream.is_closed());
        streams.len()
    }
}

impl Listener for BroadcastListener {
    fn messages(&self) -> BoxStream<'static, Message> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver_stream(receiver)
    }
}

/// Adapt an unbounded receiver into a stream that ends once every sender is gone.
pub(crate) fn receiver_stream<T>(receiver: mpsc::UnboundedReceiver<T>) -> BoxStream<'static, T>
where
    T: Send + 'static,
{
    stream::unfold(receiver, |mut receiver| async move {
        let item = receiver.recv().await?;
        Some((item, receiver))
    })
    .boxed()
}

/// Decode one message, logging and discarding it if malformed.
pub(crate) fn decode_or_log<T, C>(codec: &C, message: &Message) -> Option<T>
where
    T: DeserializeOwned,
    C: Codec,
{
    match codec.decode::<T>(&message.content) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(
                topic = %message.topic,
                target_type = std::any::type_name::<T>(),
                content = %message.content_lossy(),
                %error,
                "dropping malformed message"
            );
            None
        }
    }
}

/// Combinators over raw message streams.
pub trait MessageStreamExt: Stream<Item = Message> + Sized + Send + 'static {
    /// Keep only messages addressed to `topic`.
    fn for_topic(self, topic: impl Into<String>) -> BoxStream<'static, Message> {
        let topic = topic.into();
        self.filter(move |message| future::ready(message.topic == topic))
            .boxed()
    }

    /// Decode every message into `T`.
    ///
    /// A malformed message is logged and skipped; the stream stays open.
    fn decode_content<T, C>(self, codec: C) -> BoxStream<'static, T>
    where
        T: DeserializeOwned + Send + 'static,
        C: Codec,
    {
        self.filter_map(move |message| future::ready(decode_or_log::<T, C>(&codec, &message)))
            .boxed()
    }
}

impl<S> MessageStreamExt for S where S: Stream<Item = Message> + Send + 'static {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Ping {
        seq: u32,
    }

    #[tokio::test]
    async fn test_every_stream_sees_broadcasts() {
        let listener = BroadcastListener::new();
        let mut first = listener.messages();
        let mut second = listener.messages();
        assert_eq!(listener.stream_count(), 2);

        assert_eq!(listener.broadcast(Message::new("a", b"1".to_vec())), 2);

        assert_eq!(first.next().await.unwrap().topic, "a");
        assert_eq!(second.next().await.unwrap().topic, "a");
    }

    #[tokio::test]
    async fn test_broadcast_without_streams_is_dropped() {
        let listener = BroadcastListener::new();
        assert_eq!(listener.broadcast(Message::new("a", b"1".to_vec())), 0);
    }

    #[tokio::test]
    async fn test_for_topic_filters() {
        let listener = BroadcastListener::new();
        let mut pings = listener.messages().for_topic("ping");

        listener.broadcast(Message::new("pong", b"{}".to_vec()));
        listener.broadcast(Message::new("ping", b"{\"seq\":1}".to_vec()));

        let message = pings.next().await.unwrap();
        assert_eq!(message.topic, "ping");
    }

    #[tokio::test]
    async fn test_decode_content_skips_malformed() {
        let listener = BroadcastListener::new();
        let mut pings = listener
            .messages()
            .for_topic("ping")
            .decode_content::<Ping, _>(JsonCodec);

        listener.broadcast(Message::new("ping", b"garbage".to_vec()));
        listener.broadcast(Message::new("ping", b"{\"seq\":7}".to_vec()));

        assert_eq!(pings.next().await, Some(Ping { seq: 7 }));
    }

    #[tokio::test]
    async fn test_slow_stream_keeps_every_message() {
        let listener = BroadcastListener::new();
        let stream = listener.messages();

        // Far more than any fixed buffer would hold before the first read.
        for seq in 0..5000u32 {
            listener.broadcast(Message::new("tick", seq.to_string()));
        }
        drop(listener);

        let seen: Vec<u32> = stream
            .map(|message| message.content_lossy().parse::<u32>().unwrap())
            .collect()
            .await;
        assert_eq!(seen, (0..5000).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dropped_streams_are_forgotten() {
        let listener = BroadcastListener::new();
        let kept = listener.messages();
        drop(listener.messages());

        assert_eq!(listener.stream_count(), 1);
        assert_eq!(listener.broadcast(Message::new("a", b"1".to_vec())), 1);
        drop(kept);
        assert_eq!(listener.stream_count(), 0);
    }
}
