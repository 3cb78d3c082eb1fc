//! # Echo Remote Example
//!
//! Runs a caller and a fake remote runtime in one process, joined by a
//! loopback channel, and walks through the three workflow outcomes:
//! a completion, an unknown procedure, and a remote failure.

use anyhow::Result;
use async_trait::async_trait;
use courier::{routed, Performer, WorkflowError};
use courier_testing::{FakeRemote, LoopbackChannel, RemoteFailure, RemoteProcedure};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Echo {
    msg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Division {
    numerator: i64,
    denominator: i64,
}

/// Fire-and-forget event pushed by the remote side
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Heartbeat {
    seq: u64,
}

routed!(Heartbeat => "remote.heartbeat");

// ============================================================================
// Remote Procedures
// ============================================================================

struct Divide;

#[async_trait]
impl RemoteProcedure for Divide {
    async fn call(&self, payload: Value) -> Result<Value, RemoteFailure> {
        let division: Division = serde_json::from_value(payload)
            .map_err(|e| RemoteFailure::new("InvalidPayload", e.to_string()))?;
        if division.denominator == 0 {
            return Err(RemoteFailure::new("DivideByZero", "denominator is zero"));
        }
        Ok(json!(division.numerator / division.denominator))
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Echo Remote Example ===\n");

    let channel = LoopbackChannel::new();
    FakeRemote::new()
        .with_fn("echo", |payload| async move { Ok::<_, RemoteFailure>(payload) })
        .with_procedure("divide", Divide)
        .serve(&channel);

    let router = channel.router();
    let mut heartbeats = router.subscribe_routed::<Heartbeat>();
    let performer = Performer::new(router);

    let echoed: Echo = performer
        .perform("echo", &Echo { msg: "hi".into() })
        .await?;
    println!("echo       -> {:?}", echoed);

    match performer.perform::<_, Value>("launch", &()).await {
        Err(WorkflowError::InvalidProcedure(message)) => println!("launch     -> {}", message),
        other => println!("launch     -> unexpected {:?}", other),
    }

    let quotient: i64 = performer
        .perform("divide", &Division { numerator: 84, denominator: 2 })
        .await?;
    println!("84 / 2     -> {}", quotient);

    match performer
        .perform::<_, i64>("divide", &Division { numerator: 1, denominator: 0 })
        .await
    {
        Err(error) => println!("1 / 0      -> {}", error),
        Ok(value) => println!("1 / 0      -> unexpectedly {}", value),
    }

    channel.inject("remote.heartbeat", &Heartbeat { seq: 1 })?;
    if let Some(heartbeat) = heartbeats.next().await {
        println!("heartbeat  -> seq {}", heartbeat.seq);
    }

    println!("\n{} calls still pending", performer.pending_calls().len());
    Ok(())
}
