//! Reference [`ToolExecutor`] implementation: runs a shell command as a
//! subprocess, capturing stdout/stderr concurrently with waiting on the
//! child so a full pipe buffer cannot deadlock the read.

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::{ToolCall, ToolError, ToolExecutor};

/// Executes `{"command": "...", "args": [...]}` as a subprocess. A process
/// killed by the per-call timeout, or one that cannot be spawned at all, is
/// classified transient; a non-zero exit is classified non-transient since
/// retrying an identical command will not change the outcome.
pub struct ShellCommandTool;

#[async_trait::async_trait]
impl ToolExecutor for ShellCommandTool {
    fn name(&self) -> &str {
        "shell"
    }

    async fn call(&self, call: &ToolCall, timeout: Duration) -> Result<serde_json::Value, ToolError> {
        let command = call
            .arguments
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::NonTransient("missing \"command\" argument".to_owned()))?;
        let args: Vec<String> = call
            .arguments
            .get("args")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
            .unwrap_or_default();

        let mut child = Command::new(command)
            .args(&args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| ToolError::Transient(format!("failed to spawn {command:?}: {e}")))?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            String::from_utf8_lossy(&buf).into_owned()
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            String::from_utf8_lossy(&buf).into_owned()
        };

        match tokio::time::timeout(timeout, async {
            tokio::join!(child.wait(), read_stdout, read_stderr)
        })
        .await
        {
            Ok((Ok(status), stdout, stderr)) => {
                let exit_code = status.code().unwrap_or(-1);
                if exit_code == 0 {
                    Ok(serde_json::json!({"exitCode": exit_code, "stdout": stdout, "stderr": stderr}))
                } else {
                    Err(ToolError::NonTransient(format!(
                        "command exited with code {exit_code}: {stderr}"
                    )))
                }
            }
            Ok((Err(e), _, _)) => Err(ToolError::Transient(format!("failed to wait on child: {e}"))),
            Err(_) => {
                let _ = child.kill().await;
                Err(ToolError::Transient(format!("command timed out after {timeout:?}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(command: &str, args: &[&str]) -> ToolCall {
        ToolCall {
            name: "shell".to_owned(),
            arguments: serde_json::json!({"command": command, "args": args}),
        }
    }

    #[tokio::test]
    async fn successful_command_returns_output() {
        let tool = ShellCommandTool;
        let result = tool
            .call(&call("echo", &["hello"]), Duration::from_secs(5))
            .await
            .expect("should succeed");
        assert!(result["stdout"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_non_transient() {
        let tool = ShellCommandTool;
        let result = tool.call(&call("false", &[]), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ToolError::NonTransient(_))));
    }

    #[tokio::test]
    async fn timeout_kills_process_and_is_transient() {
        let tool = ShellCommandTool;
        let result = tool
            .call(&call("sleep", &["60"]), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ToolError::Transient(_))));
    }

    #[tokio::test]
    async fn missing_command_is_non_transient() {
        let tool = ShellCommandTool;
        let call = ToolCall { name: "shell".to_owned(), arguments: serde_json::json!({}) };
        let result = tool.call(&call, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ToolError::NonTransient(_))));
    }
}
