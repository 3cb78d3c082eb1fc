//! Macros for binding wire types to their topic.

/// Implement [`Routed`](crate::Routed) for a type, fixing the topic it travels on.
///
/// Once routed, a value can be sent with
/// [`Router::send_routed`](crate::Router::send_routed) and received with
/// [`Router::subscribe_routed`](crate::Router::subscribe_routed) without
/// repeating the topic name at every call site.
///
/// # Example
///
/// ```ignore
/// use courier::routed;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct VolumeChanged {
///     level: u8,
/// }
///
/// routed!(VolumeChanged => "audio.volume");
///
/// router.send_routed(&VolumeChanged { level: 7 })?;
/// ```
#[macro_export]
macro_rules! routed {
    ($($ty:ty => $topic:expr),+ $(,)?) => {
        $(
            impl $crate::Routed for $ty {
                const TOPIC: &'static str = $topic;
            }
        )+
    };
}
