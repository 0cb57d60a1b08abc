use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Status of a harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HarnessStatus {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
}

impl fmt::Display for HarnessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for HarnessStatus {
    type Err = HarnessStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(HarnessStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`HarnessStatus`] string.
#[derive(Debug, Clone)]
pub struct HarnessStatusParseError(pub String);

impl fmt::Display for HarnessStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid harness status: {:?}", self.0)
    }
}

impl std::error::Error for HarnessStatusParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A persisted harness checkpoint. The `payload` column holds the full
/// schema-versioned JSON document described by the harness state contract;
/// the flattened columns exist purely to make listing and filtering cheap
/// without deserializing every payload.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HarnessCheckpointRow {
    pub harness_id: String,
    pub schema_version: i32,
    pub agent_name: String,
    pub task_id: String,
    pub parent_harness_id: Option<String>,
    pub status: HarnessStatus,
    pub depth: i32,
    pub checkpoint_count: i64,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lightweight summary used by listing endpoints, avoiding a full payload
/// fetch for every row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HarnessSummaryRow {
    pub harness_id: String,
    pub agent_name: String,
    pub task_id: String,
    pub status: HarnessStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_status_display_roundtrip() {
        let variants = [
            HarnessStatus::Created,
            HarnessStatus::Running,
            HarnessStatus::Paused,
            HarnessStatus::Completed,
            HarnessStatus::Failed,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: HarnessStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn harness_status_invalid() {
        assert!("bogus".parse::<HarnessStatus>().is_err());
    }
}
