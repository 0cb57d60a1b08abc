//! Inner agent executor boundary: the opaque callable that consumes a
//! prompt context and produces output, with a resumable snapshot.
//!
//! This is deliberately the thinnest seam in the crate -- the agent loop
//! itself lives elsewhere. A subprocess-based reference adapter and a
//! scripted test double are the only concrete implementations that ship.

pub mod process;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::toolcall::ToolCallManager;

/// Context handed to the inner agent for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContext {
    pub task_id: String,
    pub step_id: String,
    pub description: String,
    /// Prior failure text, present when this is a sub-agent retry.
    pub prior_error: Option<String>,
}

/// What the inner agent produced, plus an opaque resumable snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorOutput {
    pub output: String,
    pub snapshot: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("agent loop reported an unrecoverable error: {0}")]
    Unrecoverable(String),
}

/// The inner agent execution engine, abstracted away from this crate's
/// durability concerns. Tool calls the agent wishes to make are routed
/// through the supplied [`ToolCallManager`] so permission/retry/budget
/// policy applies uniformly regardless of which agent loop is plugged in.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        context: PromptContext,
        tool_manager: &mut ToolCallManager,
        resume_snapshot: Option<serde_json::Value>,
    ) -> Result<ExecutorOutput, ExecutorError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn AgentExecutor) {}
};

/// A scripted executor for tests: returns a fixed output, or fails a fixed
/// number of times before succeeding, without touching a real process.
pub struct ScriptedExecutor {
    name: String,
    output: String,
    fail_times: std::sync::atomic::AtomicU32,
}

impl ScriptedExecutor {
    pub fn succeeding(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            fail_times: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn failing_then_succeeding(name: impl Into<String>, output: impl Into<String>, fail_times: u32) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            fail_times: std::sync::atomic::AtomicU32::new(fail_times),
        }
    }
}

#[async_trait]
impl AgentExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        _context: PromptContext,
        _tool_manager: &mut ToolCallManager,
        _resume_snapshot: Option<serde_json::Value>,
    ) -> Result<ExecutorOutput, ExecutorError> {
        use std::sync::atomic::Ordering;
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(ExecutorError::Unrecoverable("scripted failure".to_owned()));
        }
        Ok(ExecutorOutput { output: self.output.clone(), snapshot: None })
    }
}
