//! 沙箱文件系统工具
//!
//! SandboxFs 绑定 root_dir，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸）；
//! ReadFileTool / WriteFileTool / ListDirTool 基于 SandboxFs 提供文件管理能力。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::Tool;

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SandboxFs {
    root_dir: PathBuf,
}

impl SandboxFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    /// 校验已存在路径在沙箱内
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let path = path.trim_start_matches("./");
        let full = self.root_dir.join(path);
        let canonical = full
            .canonicalize()
            .map_err(|_| AgentError::ToolExecutionFailed(format!("Path not found: {}", path)))?;
        self.check_inside(&canonical, path)
    }

    /// 写入目标可能尚不存在：对父目录做逃逸校验
    fn resolve_for_write(&self, path: &str) -> Result<PathBuf, AgentError> {
        let path = path.trim_start_matches("./");
        let full = self.root_dir.join(path);
        let parent = full
            .parent()
            .ok_or_else(|| AgentError::PathEscape(path.to_string()))?;
        let parent_canonical = parent
            .canonicalize()
            .map_err(|_| AgentError::ToolExecutionFailed(format!("Directory not found: {}", path)))?;
        let file_name = full
            .file_name()
            .ok_or_else(|| AgentError::PathEscape(path.to_string()))?;
        Ok(self.check_inside(&parent_canonical, path)?.join(file_name))
    }

    fn check_inside(&self, canonical: &Path, original: &str) -> Result<PathBuf, AgentError> {
        let root_canon = self
            .root_dir
            .canonicalize()
            .unwrap_or_else(|_| self.root_dir.clone());
        if canonical.starts_with(root_canon) {
            Ok(canonical.to_path_buf())
        } else {
            Err(AgentError::PathEscape(original.to_string())) // 如 ../../etc/passwd
        }
    }

    pub fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Read failed: {}", e)))
    }

    pub fn write_file(&self, path: &str, contents: &str) -> Result<(), AgentError> {
        let resolved = self.resolve_for_write(path)?;
        std::fs::write(&resolved, contents)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Write failed: {}", e)))
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, AgentError> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("List failed: {}", e)))?
        {
            let e = e.map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))?;
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let ty = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.push(format!("{}{}", name, ty));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

/// 读取文件内容
pub struct ReadFileTool {
    fs: SandboxFs,
}

impl ReadFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SandboxFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read file contents from the workspace. Args: {\"path\": \"file path relative to workspace\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path relative to the workspace root" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
        tracing::info!(path = %path, "read_file tool execute");
        self.fs.read_file(path).map_err(|e| e.to_string())
    }
}

/// 写入文件（覆盖）
pub struct WriteFileTool {
    fs: SandboxFs,
}

impl WriteFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SandboxFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text to a file in the workspace, overwriting it. Args: {\"path\": \"...\", \"contents\": \"...\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path relative to the workspace root" },
                "contents": { "type": "string", "description": "Full file contents to write" }
            },
            "required": ["path", "contents"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let contents = args.get("contents").and_then(|v| v.as_str()).unwrap_or("");
        if path.is_empty() {
            return Err("Missing path".to_string());
        }
        tracing::info!(path = %path, bytes = contents.len(), "write_file tool execute");
        self.fs
            .write_file(path, contents)
            .map(|_| format!("Wrote {} bytes to {}", contents.len(), path))
            .map_err(|e| e.to_string())
    }
}

/// 列出目录
pub struct ListDirTool {
    fs: SandboxFs,
}

impl ListDirTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SandboxFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List a workspace directory. Args: {\"path\": \"directory path, default '.'\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path relative to the workspace root" }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        tracing::info!(path = %path, "list_dir tool execute");
        let entries = self.fs.list_dir(path).map_err(|e| e.to_string())?;
        Ok(entries.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn write_then_read_inside_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let write = WriteFileTool::new(dir.path());
        let read = ReadFileTool::new(dir.path());

        let out = write
            .execute(json!({"path": "note.txt", "contents": "hello"}))
            .await
            .unwrap();
        assert!(out.contains("note.txt"));

        let contents = read.execute(json!({"path": "note.txt"})).await.unwrap();
        assert_eq!(contents, "hello");
    }

    #[tokio::test]
    async fn list_dir_sorts_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let list = ListDirTool::new(dir.path());
        let out = list.execute(json!({})).await.unwrap();
        assert_eq!(out, "a.txt\nb.txt");
    }

    #[test]
    fn escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("sandbox");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(dir.path().join("secret.txt"), "x").unwrap();

        let fs = SandboxFs::new(&inner);
        let err = fs.read_file("../secret.txt").unwrap_err();
        assert!(matches!(err, AgentError::PathEscape(_)));
    }
}
