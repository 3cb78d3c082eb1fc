//! The unit carried by the shared channel in both directions.

/// A topic-addressed blob travelling over the notification channel.
///
/// The channel itself knows nothing about the content: it is whatever the
/// [`Codec`](crate::Codec) produced for the value sent on `topic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub content: Vec<u8>,
}

impl Message {
    pub fn new(topic: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            content: content.into(),
        }
    }

    /// Content rendered as text for diagnostics. Invalid UTF-8 is replaced.
    pub fn content_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}
