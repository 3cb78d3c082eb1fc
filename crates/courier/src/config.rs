//! Tunables for the router and the performer.
//!
//! Both are plain structs with `Default`; the builders in
//! [`router`](crate::router) and [`performer`](crate::performer) fill them in.

use std::time::Duration;

/// Router settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Remove a topic stream when a dispatch finds no live subscriber on it.
    pub prune_idle_topics: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            prune_idle_topics: true,
        }
    }
}

/// What happens to the pending call when its caller stops waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancellationPolicy {
    /// Keep the pending call registered until the remote replies (normally
    /// with a `Cancelled` failure). The remote's reply is then expected and
    /// never reported as an unknown correlation. If the remote never replies
    /// the entry stays registered.
    #[default]
    AwaitRemote,

    /// Drop the pending call immediately. A reply the remote sends later is
    /// reported as an unknown correlation.
    ResolveLocally,
}

/// Performer settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PerformerConfig {
    /// Resolve a call locally with `WorkflowError::Timeout` if no reply
    /// arrives in time. `None` waits forever.
    pub call_timeout: Option<Duration>,

    pub cancellation: CancellationPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let router = RouterConfig::default();
        assert!(router.prune_idle_topics);

        let performer = PerformerConfig::default();
        assert_eq!(performer.call_timeout, None);
        assert_eq!(performer.cancellation, CancellationPolicy::AwaitRemote);
    }
}
