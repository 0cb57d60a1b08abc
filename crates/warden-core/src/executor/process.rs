//! Subprocess-based reference [`AgentExecutor`]: spawns a configured binary
//! per step, feeds it the prompt context on stdin as JSON, and treats its
//! stdout as the step's output. The opaque snapshot is the subprocess's
//! final stdout payload, which a real agent loop would use to resume a
//! stateful conversation; this adapter carries it through unexamined.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::toolcall::ToolCallManager;

use super::{AgentExecutor, ExecutorError, ExecutorOutput, PromptContext};

/// Spawns `binary_path` with `extra_args`, writes the [`PromptContext`] as a
/// JSON line to stdin, and reads stdout to completion as the step's output.
pub struct ProcessAgentExecutor {
    name: String,
    binary_path: String,
    extra_args: Vec<String>,
}

impl ProcessAgentExecutor {
    pub fn new(name: impl Into<String>, binary_path: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self { name: name.into(), binary_path: binary_path.into(), extra_args }
    }
}

#[async_trait]
impl AgentExecutor for ProcessAgentExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        context: PromptContext,
        _tool_manager: &mut ToolCallManager,
        resume_snapshot: Option<serde_json::Value>,
    ) -> Result<ExecutorOutput, ExecutorError> {
        let payload = serde_json::json!({
            "taskId": context.task_id,
            "stepId": context.step_id,
            "description": context.description,
            "priorError": context.prior_error,
            "resumeSnapshot": resume_snapshot,
        });

        let mut child = Command::new(&self.binary_path)
            .args(&self.extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecutorError::Unrecoverable(format!("failed to spawn {:?}: {e}", self.binary_path)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let line = format!("{payload}\n");
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| ExecutorError::Unrecoverable(format!("failed to write prompt: {e}")))?;
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let read_stdout = async {
            if let Some(mut pipe) = stdout_pipe {
                let _ = pipe.read_to_end(&mut stdout).await;
            }
        };
        let read_stderr = async {
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut stderr).await;
            }
        };
        tokio::join!(read_stdout, read_stderr);

        let status = child
            .wait()
            .await
            .map_err(|e| ExecutorError::Unrecoverable(format!("failed to wait on child: {e}")))?;

        if !status.success() {
            return Err(ExecutorError::Unrecoverable(format!(
                "{} exited with {:?}: {}",
                self.binary_path,
                status.code(),
                String::from_utf8_lossy(&stderr)
            )));
        }

        let output = String::from_utf8_lossy(&stdout).trim().to_owned();
        Ok(ExecutorOutput { output, snapshot: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use std::collections::HashSet;

    fn manager() -> ToolCallManager {
        ToolCallManager::new("h-1".to_owned(), HarnessConfig::default(), HashSet::new(), vec![])
    }

    #[tokio::test]
    async fn runs_cat_and_captures_output() {
        let executor = ProcessAgentExecutor::new("cat-echo", "cat", vec![]);
        let mut mgr = manager();
        let ctx = PromptContext {
            task_id: "t".into(),
            step_id: "s".into(),
            description: "d".into(),
            prior_error: None,
        };
        let out = executor.run(ctx, &mut mgr, None).await.unwrap();
        assert!(out.output.contains("\"taskId\":\"t\""));
    }

    #[tokio::test]
    async fn nonzero_exit_is_unrecoverable() {
        let executor = ProcessAgentExecutor::new("false", "false", vec![]);
        let mut mgr = manager();
        let ctx = PromptContext {
            task_id: "t".into(),
            step_id: "s".into(),
            description: "d".into(),
            prior_error: None,
        };
        let result = executor.run(ctx, &mut mgr, None).await;
        assert!(matches!(result, Err(ExecutorError::Unrecoverable(_))));
    }
}
