//! Observability event contract.
//!
//! Every significant harness transition is emitted as a typed [`Event`] to
//! every registered [`EventSink`]. Emission is best-effort: a sink failure
//! is logged and never propagates back to the harness.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The kind of a tool-call failure, surfaced on failed `tool_call` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Permission,
    Budget,
    Timeout,
    Transient,
    NonTransient,
}

/// A sub-agent lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentEventKind {
    Spawned,
    Completed,
    Failed,
}

/// A human-gate lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    Waiting,
    Approved,
    Rejected,
}

/// The discriminated payload of an [`Event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    StateTransition {
        from: String,
        to: String,
    },
    ToolCall {
        tool_name: String,
        duration_ms: u64,
        success: bool,
        retry_count: u32,
        error_kind: Option<ToolErrorKind>,
    },
    HumanGate {
        gate_id: String,
        step_id: String,
        action: GateAction,
        wait_duration_ms: Option<u64>,
    },
    SubAgent {
        sub_agent_id: String,
        event: SubAgentEventKind,
    },
    Checkpoint {
        checkpoint_number: u64,
    },
    StepFailed {
        step_id: String,
        error: String,
    },
    PlanCompleted,
    /// Emitted once per harness the first time the primary store is found
    /// unavailable and operations fall back to the secondary backend.
    StoreDegraded {
        reason: String,
    },
}

/// A single observability event emitted by a harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub harness_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(harness_id: impl Into<String>, timestamp: DateTime<Utc>, kind: EventKind) -> Self {
        Self {
            harness_id: harness_id.into(),
            timestamp,
            kind,
        }
    }
}

/// A destination for observability events.
///
/// Implementations must not block indefinitely; the emitter treats any
/// error as non-fatal and continues to the next sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &Event) -> anyhow::Result<()>;
}

/// Fans an event out to every registered sink, swallowing sink errors.
pub struct Emitter {
    sinks: Vec<Box<dyn EventSink>>,
}

impl Emitter {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub async fn emit(&self, event: Event) {
        for sink in &self.sinks {
            if let Err(err) = sink.emit(&event).await {
                warn!(harness_id = %event.harness_id, error = %err, "event sink failed");
            }
        }
    }
}

/// Logs every event via `tracing` at info level with structured fields.
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn emit(&self, event: &Event) -> anyhow::Result<()> {
        match &event.kind {
            EventKind::StateTransition { from, to } => {
                tracing::info!(harness_id = %event.harness_id, from, to, "state_transition");
            }
            EventKind::ToolCall {
                tool_name,
                duration_ms,
                success,
                retry_count,
                error_kind,
            } => {
                tracing::info!(
                    harness_id = %event.harness_id,
                    tool_name,
                    duration_ms,
                    success,
                    retry_count,
                    ?error_kind,
                    "tool_call"
                );
            }
            EventKind::HumanGate {
                gate_id,
                step_id,
                action,
                wait_duration_ms,
            } => {
                tracing::info!(
                    harness_id = %event.harness_id,
                    gate_id,
                    step_id,
                    ?action,
                    ?wait_duration_ms,
                    "human_gate"
                );
            }
            EventKind::SubAgent { sub_agent_id, event: kind } => {
                tracing::info!(harness_id = %event.harness_id, sub_agent_id, ?kind, "sub_agent");
            }
            EventKind::Checkpoint { checkpoint_number } => {
                tracing::info!(harness_id = %event.harness_id, checkpoint_number, "checkpoint");
            }
            EventKind::StepFailed { step_id, error } => {
                tracing::info!(harness_id = %event.harness_id, step_id, error, "step_failed");
            }
            EventKind::PlanCompleted => {
                tracing::info!(harness_id = %event.harness_id, "plan_completed");
            }
            EventKind::StoreDegraded { reason } => {
                tracing::warn!(harness_id = %event.harness_id, reason, "store_degraded");
            }
        }
        Ok(())
    }
}

/// In-memory sink used by tests to assert on emitted event sequences.
#[derive(Default)]
pub struct RecordingSink {
    events: tokio::sync::Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recorded(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: &Event) -> anyhow::Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
