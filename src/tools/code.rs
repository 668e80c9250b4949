//! 代码执行工具：python3 子进程
//!
//! 在工作区目录内以 `python3 -c` 运行代码片段，带超时。观察到的只有程序打印的
//! 内容，因此助手指令中要求显式 print 输出。非零退出码连同 stderr 作为错误返回。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::Tool;

/// Python 执行工具：超时内运行片段并捕获 stdout/stderr
pub struct RunPythonTool {
    workdir: PathBuf,
    timeout_secs: u64,
}

impl RunPythonTool {
    pub fn new(workdir: impl AsRef<Path>, timeout_secs: u64) -> Self {
        Self {
            workdir: workdir.as_ref().to_path_buf(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl Tool for RunPythonTool {
    fn name(&self) -> &str {
        "run_python"
    }

    fn description(&self) -> &str {
        "Run a Python snippet and return what it prints. Output is captured from stdout only, so use print(). Args: {\"code\": \"print(1 + 1)\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": { "type": "string", "description": "Python source to execute; print() anything you need to see" }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let code = args.get("code").and_then(|v| v.as_str()).unwrap_or("");
        if code.trim().is_empty() {
            return Err("Missing code".to_string());
        }

        tracing::info!(bytes = code.len(), "run_python tool execute");

        let mut cmd = Command::new("python3");
        cmd.arg("-c").arg(code).current_dir(&self.workdir);

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            cmd.output(),
        )
        .await
        .map_err(|_| format!("Code timed out after {}s", self.timeout_secs))?
        .map_err(|e| format!("Execution failed: {}", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(format!("Exit {:?}\nstderr: {}", output.status, stderr.trim()));
        }
        if stdout.trim().is_empty() {
            return Ok("(no output — nothing was printed)".to_string());
        }
        Ok(if stderr.is_empty() {
            stdout
        } else {
            format!("{}\nstderr: {}", stdout.trim(), stderr.trim())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_code_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RunPythonTool::new(dir.path(), 5);
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(err.contains("Missing code"));
    }
}
