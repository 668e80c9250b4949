//! Web 搜索/抓取工具：域名白名单、超时、结果大小限制
//!
//! query 参数走可配置的搜索端点；url 参数直接抓取（仅白名单域名）。GET 请求带
//! 超时与 User-Agent；响应超过 max_result_chars 时截断并追加 ...[truncated]。
//! HTML 响应用 html2text 提取可读文本。

use std::collections::HashSet;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::Client;
use serde_json::Value;

use crate::tools::Tool;

/// Web 搜索工具：query 检索或 url 抓取，仅允许白名单域名
pub struct WebSearchTool {
    client: Client,
    allowed_domains: HashSet<String>,
    search_endpoint: String,
    max_result_chars: usize,
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut prev_whitespace = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => {
                let is_whitespace = c.is_whitespace();
                if is_whitespace && prev_whitespace {
                    continue;
                }
                prev_whitespace = is_whitespace;
                out.push(if is_whitespace { ' ' } else { c });
            }
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20
            && s.contains('<')
            && (s.contains("</") || s.contains("<meta") || s.contains("<head") || s.contains("<title")))
}

/// 从 URL 中提取 host（不含端口与路径）
pub(crate) fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    Some(host.to_lowercase())
}

impl WebSearchTool {
    pub fn new(
        allowed_domains: Vec<String>,
        search_endpoint: String,
        timeout_secs: u64,
        max_result_chars: usize,
    ) -> Self {
        let mut allowed_domains: HashSet<String> = allowed_domains
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        // 搜索端点自身的域名总是允许
        if let Some(d) = extract_domain(&search_endpoint) {
            allowed_domains.insert(d);
        }
        const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains,
            search_endpoint,
            max_result_chars,
        }
    }

    fn is_allowed(&self, url: &str) -> Result<(), String> {
        let domain = extract_domain(url).ok_or_else(|| "Invalid or missing URL".to_string())?;
        if self.allowed_domains.contains(&domain) {
            return Ok(());
        }
        Err(format!("Domain not in allowlist: {}", domain))
    }

    fn html_to_text(&self, html: &str) -> String {
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        self.is_allowed(url)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let mut body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;

        if body.starts_with('\u{FEFF}') {
            body = body[1..].to_string();
        }

        let body = if looks_like_html(&body) {
            self.html_to_text(&body)
        } else {
            body
        };

        let len = body.chars().count();
        if len > self.max_result_chars {
            Ok(body.chars().take(self.max_result_chars).collect::<String>() + "\n...[truncated]")
        } else {
            Ok(body)
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web ({\"query\": \"...\"}) or fetch a specific URL ({\"url\": \"https://...\"}, domain allowlist applies). Returns readable page text."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "url": { "type": "string", "description": "Exact URL to fetch instead of searching" }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        if let Some(query) = args.get("query").and_then(|v| v.as_str()).filter(|q| !q.trim().is_empty()) {
            let url = format!(
                "{}{}",
                self.search_endpoint,
                urlencode(query.trim())
            );
            tracing::info!(query = %query, "web_search tool query");
            return self.fetch(&url).await;
        }
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or("").trim();
        if url.is_empty() {
            return Err("Missing query or url".to_string());
        }
        tracing::info!(url = %url, "web_search tool fetch");
        self.fetch(url).await
    }
}

/// 最小化的查询编码（空格与保留字符）
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_extraction() {
        assert_eq!(
            extract_domain("https://en.wikipedia.org/wiki/Paris"),
            Some("en.wikipedia.org".to_string())
        );
        assert_eq!(
            extract_domain("http://example.com:8080/x"),
            Some("example.com".to_string())
        );
        assert_eq!(extract_domain("not a url"), None);
    }

    #[test]
    fn allowlist_rejects_unknown_domain() {
        let tool = WebSearchTool::new(
            vec!["en.wikipedia.org".into()],
            "https://html.duckduckgo.com/html/?q=".into(),
            5,
            1000,
        );
        assert!(tool.is_allowed("https://en.wikipedia.org/wiki/Paris").is_ok());
        // 搜索端点域名自动放行
        assert!(tool.is_allowed("https://html.duckduckgo.com/html/?q=x").is_ok());
        assert!(tool.is_allowed("https://evil.example.com/").is_err());
    }

    #[test]
    fn query_encoding() {
        assert_eq!(urlencode("capital of France"), "capital+of+France");
        assert_eq!(urlencode("a&b"), "a%26b");
    }
}
