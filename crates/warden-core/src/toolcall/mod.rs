//! Tool-call manager: permission gating, timeout, retry with backoff, and
//! budget enforcement for every tool invocation an agent makes.

pub mod shell;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;

use crate::config::HarnessConfig;
use crate::events::{Emitter, Event, EventKind, ToolErrorKind};

/// A tool invocation requested by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Whether a tool's failure should be retried.
#[derive(Debug, Clone)]
pub enum ToolError {
    Transient(String),
    NonTransient(String),
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolError::Transient(m) | ToolError::NonTransient(m) => write!(f, "{m}"),
        }
    }
}

/// A tool implementation. Each tool advertises nothing about permissions --
/// that is the agent's responsibility (via [`ToolCallManager::new`]'s
/// `permitted_tools` set) -- but it does classify its own failures as
/// transient or not.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &str;
    async fn call(&self, call: &ToolCall, timeout: Duration) -> Result<serde_json::Value, ToolError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn ToolExecutor) {}
};

/// Errors the manager itself raises, independent of the tool's own outcome.
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("tool {0:?} is not permitted for this agent")]
    PermissionDenied(String),
    #[error("tool-call budget exhausted ({used}/{max})")]
    BudgetExceeded { used: u32, max: u32 },
    #[error("no tool registered with name {0:?}")]
    UnknownTool(String),
    #[error("tool call failed: {0}")]
    Failed(String),
}

/// A recorded tool invocation, whether executed or rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
    pub rejected: bool,
}

/// Mediates every tool call an agent makes on behalf of a single harness:
/// permission check, budget check, timeout, retry with exponential backoff,
/// and history recording.
pub struct ToolCallManager {
    harness_id: String,
    config: HarnessConfig,
    permitted_tools: HashSet<String>,
    tools: Vec<Box<dyn ToolExecutor>>,
    history: Vec<ToolCallRecord>,
    total_calls: u32,
}

impl ToolCallManager {
    pub fn new(
        harness_id: impl Into<String>,
        config: HarnessConfig,
        permitted_tools: HashSet<String>,
        tools: Vec<Box<dyn ToolExecutor>>,
    ) -> Self {
        Self {
            harness_id: harness_id.into(),
            config,
            permitted_tools,
            tools,
            history: Vec::new(),
            total_calls: 0,
        }
    }

    /// Rebuild a manager from a persisted checkpoint's history, preserving
    /// `totalCalls` across a restart.
    pub fn restore(
        harness_id: impl Into<String>,
        config: HarnessConfig,
        permitted_tools: HashSet<String>,
        tools: Vec<Box<dyn ToolExecutor>>,
        history: Vec<ToolCallRecord>,
        total_calls: u32,
    ) -> Self {
        Self {
            harness_id: harness_id.into(),
            config,
            permitted_tools,
            tools,
            history,
            total_calls,
        }
    }

    pub fn history(&self) -> &[ToolCallRecord] {
        &self.history
    }

    pub fn total_calls(&self) -> u32 {
        self.total_calls
    }

    fn find_tool_index(&self, name: &str) -> Option<usize> {
        self.tools.iter().position(|t| t.name() == name)
    }

    /// Execute a tool call subject to permission, budget, timeout, and retry
    /// policy. Always records the outcome in history.
    pub async fn execute(
        &mut self,
        call: ToolCall,
        emitter: Option<&Emitter>,
    ) -> Result<serde_json::Value, ToolCallError> {
        if !self.permitted_tools.contains(&call.name) {
            self.record_rejection(&call, "permission denied");
            self.emit_failure(emitter, &call.name, 0, 0, ToolErrorKind::Permission).await;
            return Err(ToolCallError::PermissionDenied(call.name));
        }

        if self.total_calls >= self.config.max_total_tool_calls {
            self.record_rejection(&call, "budget exceeded");
            self.emit_failure(emitter, &call.name, 0, 0, ToolErrorKind::Budget).await;
            return Err(ToolCallError::BudgetExceeded {
                used: self.total_calls,
                max: self.config.max_total_tool_calls,
            });
        }

        let Some(tool_idx) = self.find_tool_index(&call.name) else {
            self.total_calls += 1;
            self.record_rejection(&call, "unknown tool");
            self.emit_failure(emitter, &call.name, 0, 0, ToolErrorKind::NonTransient).await;
            return Err(ToolCallError::UnknownTool(call.name));
        };

        self.total_calls += 1;
        let per_call_timeout = Duration::from_millis(self.config.tool_call_timeout_ms);
        let started = Instant::now();
        let mut retry_count = 0u32;
        let mut last_error: Option<ToolError> = None;

        loop {
            let attempt = timeout(per_call_timeout, self.tools[tool_idx].call(&call, per_call_timeout)).await;

            let outcome = match attempt {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(ToolError::Transient("tool call timed out".to_owned())),
            };

            match outcome {
                Ok(value) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    self.history.push(ToolCallRecord {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                        result: Some(value.clone()),
                        error: None,
                        duration_ms,
                        retry_count,
                        timestamp: Utc::now(),
                        rejected: false,
                    });
                    self.emit_success(emitter, &call.name, duration_ms, retry_count).await;
                    return Ok(value);
                }
                Err(ToolError::Transient(msg)) if retry_count < self.config.max_tool_retries => {
                    last_error = Some(ToolError::Transient(msg));
                    let backoff = self.config.base_backoff_ms * (1u64 << retry_count);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    let kind = match &e {
                        ToolError::Transient(_) => ToolErrorKind::Timeout,
                        ToolError::NonTransient(_) => ToolErrorKind::NonTransient,
                    };
                    let message = e.to_string();
                    self.history.push(ToolCallRecord {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                        result: None,
                        error: Some(message.clone()),
                        duration_ms,
                        retry_count,
                        timestamp: Utc::now(),
                        rejected: false,
                    });
                    self.emit_failure(emitter, &call.name, duration_ms, retry_count, kind).await;
                    last_error = Some(e);
                    return Err(ToolCallError::Failed(
                        last_error.map(|e| e.to_string()).unwrap_or(message),
                    ));
                }
            }
        }
    }

    fn record_rejection(&mut self, call: &ToolCall, reason: &str) {
        self.history.push(ToolCallRecord {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            result: None,
            error: Some(reason.to_owned()),
            duration_ms: 0,
            retry_count: 0,
            timestamp: Utc::now(),
            rejected: true,
        });
    }

    async fn emit_success(&self, emitter: Option<&Emitter>, name: &str, duration_ms: u64, retry_count: u32) {
        if let Some(emitter) = emitter {
            emitter
                .emit(Event::new(
                    self.harness_id.clone(),
                    Utc::now(),
                    EventKind::ToolCall {
                        tool_name: name.to_owned(),
                        duration_ms,
                        success: true,
                        retry_count,
                        error_kind: None,
                    },
                ))
                .await;
        }
    }

    async fn emit_failure(
        &self,
        emitter: Option<&Emitter>,
        name: &str,
        duration_ms: u64,
        retry_count: u32,
        kind: ToolErrorKind,
    ) {
        if let Some(emitter) = emitter {
            emitter
                .emit(Event::new(
                    self.harness_id.clone(),
                    Utc::now(),
                    EventKind::ToolCall {
                        tool_name: name.to_owned(),
                        duration_ms,
                        success: false,
                        retry_count,
                        error_kind: Some(kind),
                    },
                ))
                .await;
        }
    }
}
