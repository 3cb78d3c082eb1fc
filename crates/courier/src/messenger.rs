//! Outbound half of the channel.

use std::sync::Arc;

use crate::error::TransportError;

/// Physically transmits an outgoing message to the other runtime.
///
/// `send` is a synchronous hand-off: implementations queue or write the
/// message and return. It is also called from `Drop` when a pending call is
/// cancelled, so it must not block on the remote.
pub trait Messenger: Send + Sync + 'static {
    fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}

impl<M: Messenger + ?Sized> Messenger for Arc<M> {
    fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        (**self).send(topic, payload)
    }
}

impl<M: Messenger + ?Sized> Messenger for Box<M> {
    fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        (**self).send(topic, payload)
    }
}
