//! Human-in-loop gate: suspends step dispatch pending human approval,
//! placed according to the harness's autonomy level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resolution state of a single gate. Gates are one-shot: once resolved they
/// cannot be reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pending,
    Approved,
    Rejected,
}

/// A pending or resolved human checkpoint attached to a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanGate {
    pub gate_id: String,
    pub step_id: String,
    pub status: GateStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl HumanGate {
    pub fn new(gate_id: impl Into<String>, step_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            gate_id: gate_id.into(),
            step_id: step_id.into(),
            status: GateStatus::Pending,
            reason: None,
            created_at,
            resolved_at: None,
        }
    }

    pub fn wait_duration_ms(&self, now: DateTime<Utc>) -> i64 {
        let end = self.resolved_at.unwrap_or(now);
        (end - self.created_at).num_milliseconds().max(0)
    }

    /// Resolve a pending gate as approved.
    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<(), GateError> {
        if self.status != GateStatus::Pending {
            return Err(GateError::AlreadyResolved(self.gate_id.clone()));
        }
        self.status = GateStatus::Approved;
        self.resolved_at = Some(now);
        Ok(())
    }

    /// Resolve a pending gate as rejected, recording the reason.
    pub fn reject(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), GateError> {
        if self.status != GateStatus::Pending {
            return Err(GateError::AlreadyResolved(self.gate_id.clone()));
        }
        self.status = GateStatus::Rejected;
        self.reason = Some(reason.into());
        self.resolved_at = Some(now);
        Ok(())
    }
}

/// Errors raised while resolving a gate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("gate {0:?} has already been resolved and cannot be reopened")]
    AlreadyResolved(String),
}

/// Whether a gate must be inserted before dispatching a given step, per the
/// harness's autonomy level.
///
/// | Level | Gate placement |
/// |---|---|
/// | 1, 2 | Before every step |
/// | 3 | Before every critical step only |
/// | 4, 5 | No gates |
pub fn gate_required(autonomy_level: u8, step_is_critical: bool) -> bool {
    match autonomy_level {
        1 | 2 => true,
        3 => step_is_critical,
        _ => false,
    }
}
