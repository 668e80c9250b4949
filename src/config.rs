//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SIDEKICK__*` 覆盖（双下划线表示嵌套，
//! 如 `SIDEKICK__LLM__MODEL=gpt-4o`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub run: RunSection,
}

/// [app] 段：应用名、沙箱根目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 沙箱根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
}

/// [llm] 段：端点与两个角色的模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: Option<String>,
    /// 助手模型
    pub model: String,
    /// 评估者模型（可与助手不同，降低自我认同）
    pub evaluator_model: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            evaluator_model: "gpt-4o".to_string(),
        }
    }
}

/// [run] 段：控制循环参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSection {
    /// 单次 run 内评估轮数上限；超限转为需要用户介入
    pub max_evaluator_rounds: u32,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            max_evaluator_rounds: 10,
        }
    }
}

/// [tools] 段：工具超时、搜索、代码执行、通知
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub search: SearchSection,
    pub code: CodeSection,
    pub notify: NotifySection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            search: SearchSection::default(),
            code: CodeSection::default(),
            notify: NotifySection::default(),
        }
    }
}

/// [tools.search] 段：抓取超时、最大字符数、域名白名单、检索端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub timeout_secs: u64,
    pub max_result_chars: usize,
    pub allowed_domains: Vec<String>,
    /// query 拼接到此端点之后
    pub search_endpoint: String,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_result_chars: 8000,
            allowed_domains: default_allowed_domains(),
            search_endpoint: "https://html.duckduckgo.com/html/?q=".to_string(),
        }
    }
}

fn default_allowed_domains() -> Vec<String> {
    vec![
        "en.wikipedia.org".into(),
        "simple.wikipedia.org".into(),
        "github.com".into(),
        "raw.githubusercontent.com".into(),
        "stackoverflow.com".into(),
        "docs.rs".into(),
        "crates.io".into(),
        "doc.rust-lang.org".into(),
        "docs.python.org".into(),
        "pypi.org".into(),
        "developer.mozilla.org".into(),
        "arxiv.org".into(),
        "news.ycombinator.com".into(),
        "www.reddit.com".into(),
        "openweathermap.org".into(),
    ]
}

/// [tools.code] 段：代码执行超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodeSection {
    pub timeout_secs: u64,
}

impl Default for CodeSection {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// [tools.notify] 段：推送端点（凭据走 PUSHOVER_* 环境变量）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    pub endpoint: String,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            endpoint: "https://api.pushover.net/1/messages.json".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            tools: ToolsSection::default(),
            run: RunSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 SIDEKICK__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SIDEKICK__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SIDEKICK")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.run.max_evaluator_rounds, 10);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert!(!cfg.tools.search.allowed_domains.is_empty());
        assert_ne!(cfg.llm.model, cfg.llm.evaluator_model);
    }
}
