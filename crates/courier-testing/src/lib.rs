//! Testing utilities for Courier.
//!
//! - [`LoopbackChannel`] stands in for the physical channel: it records what a
//!   router sends and lets tests inject inbound messages.
//! - [`FakeRemote`] stands in for the other runtime: it serves requests with
//!   registered procedures and answers cancellations.
//!
//! ```ignore
//! use courier::Performer;
//! use courier_testing::{FakeRemote, LoopbackChannel};
//!
//! let channel = LoopbackChannel::new();
//! FakeRemote::new()
//!     .with_fn("echo", |payload| async move { Ok(payload) })
//!     .serve(&channel);
//!
//! let performer = Performer::new(channel.router());
//! let echoed: String = performer.perform("echo", "hi").await?;
//! ```

mod loopback;
mod remote;

pub use loopback::{LoopbackChannel, RecordingMessenger};
pub use remote::{FakeRemote, FnProcedure, RemoteFailure, RemoteProcedure};
