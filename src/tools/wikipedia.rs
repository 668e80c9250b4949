//! 维基百科查询工具：REST summary 端点
//!
//! 结构化百科检索：按标题取条目摘要（JSON），输出标题、短描述与摘要正文；
//! 条目不存在时返回明确错误供模型改写查询。

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::Tool;

const SUMMARY_ENDPOINT: &str = "https://en.wikipedia.org/api/rest_v1/page/summary";

#[derive(Debug, Deserialize)]
struct PageSummary {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    extract: Option<String>,
}

/// Wikipedia 工具：条目摘要查询
pub struct WikipediaTool {
    client: Client,
    max_result_chars: usize,
}

impl WikipediaTool {
    pub fn new(timeout_secs: u64, max_result_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("sidekick/0.1 (encyclopedia lookup)")
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_result_chars,
        }
    }

    async fn lookup(&self, title: &str) -> Result<String, String> {
        let url = format!("{}/{}", SUMMARY_ENDPOINT, title.replace(' ', "_"));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if resp.status().as_u16() == 404 {
            return Err(format!("No Wikipedia page found for '{}'", title));
        }
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let summary: PageSummary = resp
            .json()
            .await
            .map_err(|e| format!("Parse summary: {}", e))?;

        let mut out = format!("# {}\n", summary.title);
        if let Some(desc) = summary.description {
            out.push_str(&format!("{}\n\n", desc));
        }
        if let Some(extract) = summary.extract {
            out.push_str(&extract);
        }
        if out.chars().count() > self.max_result_chars {
            out = out.chars().take(self.max_result_chars).collect::<String>() + "\n...[truncated]";
        }
        Ok(out)
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn description(&self) -> &str {
        "Look up a topic on Wikipedia and return its summary. Args: {\"title\": \"page title, e.g. 'France'\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Wikipedia page title to look up" }
            },
            "required": ["title"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let title = args.get("title").and_then(|v| v.as_str()).unwrap_or("").trim();
        if title.is_empty() {
            return Err("Missing title".to_string());
        }
        tracing::info!(title = %title, "wikipedia tool lookup");
        self.lookup(title).await
    }
}
