//! Decision telemetry.
//!
//! One [`DecisionEvent`] per cascade decision, delivered to a
//! [`DecisionSink`]. Emission is fire-and-forget: a slow consumer can lag,
//! never block a conversational turn.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{MatchMethod, Stage};

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// One observation per decision.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEvent {
    /// Tenant namespace.
    pub namespace: String,
    /// Stage that terminated the cascade.
    pub stage: Stage,
    /// Matching technique used.
    pub method: MatchMethod,
    /// Similarity or confidence value, when one exists.
    pub match_score: Option<f32>,
    /// Wall-clock time spent in the cascade.
    pub latency_ms: f64,
    /// Estimated provider spend avoided relative to always escalating.
    pub cost_delta: f32,
}

/// Sink for decision observations.
pub trait DecisionSink: Send + Sync {
    /// Record one decision. Must not block.
    fn record(&self, event: &DecisionEvent);
}

/// Sink that logs decisions through `tracing`.
pub struct TracingSink;

impl DecisionSink for TracingSink {
    fn record(&self, event: &DecisionEvent) {
        tracing::info!(
            namespace = %event.namespace,
            stage = event.stage.as_str(),
            method = ?event.method,
            match_score = ?event.match_score,
            latency_ms = event.latency_ms,
            cost_delta = event.cost_delta,
            "cascade decision"
        );
    }
}

/// Sink that discards everything. Useful in tests.
pub struct NullSink;

impl DecisionSink for NullSink {
    fn record(&self, _event: &DecisionEvent) {}
}

/// Broadcast bus for decision events.
///
/// Uses a tokio broadcast channel internally. Events are fire-and-forget;
/// if no subscribers are listening, events are simply dropped, and a slow
/// subscriber misses events rather than blocking the sender.
pub struct TelemetryBus {
    sender: broadcast::Sender<DecisionEvent>,
}

impl TelemetryBus {
    /// Create a new bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new bus with custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> TelemetrySubscriber {
        TelemetrySubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for TelemetryBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl DecisionSink for TelemetryBus {
    fn record(&self, event: &DecisionEvent) {
        let _ = self.sender.send(event.clone());
    }
}

/// Subscriber to the telemetry bus.
pub struct TelemetrySubscriber {
    receiver: broadcast::Receiver<DecisionEvent>,
}

impl TelemetrySubscriber {
    /// Receive the next event. Returns `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<DecisionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("telemetry subscriber lagged by {} events", n);
                    continue;
                }
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<DecisionEvent> {
        self.receiver.try_recv().ok()
    }
}
