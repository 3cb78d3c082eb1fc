//! # Courier
//!
//! Typed request/response workflows and fire-and-forget events between two
//! independently scheduled runtimes, over a single one-directional,
//! topic-keyed notification channel.
//!
//! ## Core Concepts
//!
//! - [`Message`] = the unit on the wire: a topic plus opaque content
//! - [`Router`] = demultiplexes inbound messages to per-topic streams and
//!   forwards outbound ones to the [`Messenger`]
//! - [`PendingCalls`] = correlation identifier → suspended caller
//! - [`Performer`] = `perform(procedure, payload) -> result` on top of both
//!
//! The physical transport, the platform delivery mechanism and the remote
//! executor are outside this crate. They plug in as a [`Messenger`] (outbound)
//! and a [`Listener`] (inbound).
//!
//! ## Architecture
//!
//! ```text
//! Performer.perform()
//!     │
//!     ├─► PendingCalls.register(id)            (always before the send)
//!     │
//!     ├─► Router.send("workflow.request") ─► Messenger ─► remote runtime
//!     │                                                        │
//!     │        Listener ◄──────────────────────────────────────┘
//!     │            │
//!     │            ▼ Router.dispatch()
//!     │     "workflow.completion" / "workflow.failure" streams
//!     │            │
//!     │            ▼ standing subscriptions
//!     └───◄─ PendingCalls.complete(id) / fail(id)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Fresh identifiers** - one random UUID per call
//! 2. **Registered before sent** - a reply can never outrun its call
//! 3. **Exactly-once resolution** - removal from the registry is the only way
//!    to obtain a resolver
//! 4. **One stream per topic** - every subscriber to a topic reads the same stream
//! 5. **Local failures never hang** - encode and transport errors resolve the
//!    caller through the same pending-call slot
//!
//! ## Guarantees
//!
//! - Per-topic delivery preserves dispatch order; there is no order across topics
//! - A malformed inbound message is logged and dropped; its stream stays open
//! - Replies for unknown identifiers are logged and ignored
//! - Cancellation is best effort: the remote is notified, nothing more
//!
//! ## Example
//!
//! ```ignore
//! use courier::{BroadcastListener, Performer, Router};
//!
//! let listener = BroadcastListener::new();
//! let router = Router::new(my_messenger);
//! router.attach(&listener);
//!
//! let performer = Performer::new(router);
//! let greeting: Greeting = performer.perform("echo", &Greeting::new("hi")).await?;
//! ```
//!
//! ## What This Is Not
//!
//! Courier is **not**:
//! - A general RPC framework (no discovery, no streaming replies)
//! - A transport
//! - A retry or timeout policy engine (a per-call timeout is the only knob)

// Core modules
mod codec;
mod config;
mod error;
mod listener;
mod message;
mod messenger;
mod topic_macro;

pub mod performer;
pub mod registry;
pub mod router;
pub mod workflow;

#[cfg(test)]
mod test_support;



// Re-export capabilities
pub use codec::{Codec, JsonCodec};
pub use listener::{BroadcastListener, Listener, MessageStreamExt};
pub use message::Message;
pub use messenger::Messenger;

// Re-export configuration
pub use config::{CancellationPolicy, PerformerConfig, RouterConfig};

// Re-export error types
pub use error::{
    CodecError, DuplicateCorrelation, RouterError, TransportError, UnknownCorrelation,
    WorkflowError,
};

// Re-export router types
pub use router::{Routed, Router, RouterBuilder};

// Re-export registry types
pub use registry::{OutstandingCall, PendingCalls, Resolution, Resolver};

// Re-export performer types
pub use performer::{Performer, PerformerBuilder};

// Re-export wire types
pub use workflow::{
    FailureKind, WorkflowCancellation, WorkflowCompletion, WorkflowFailure, WorkflowRequest,
};

// Re-export commonly used external types
pub use futures::stream::BoxStream;
