//! Browser 工具：Headless Chrome 浏览器自动化
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。按会话各持一个
//! BrowserHandle：首次使用时惰性启动浏览器，会话销毁时显式释放（幂等，阻塞路径，
//! 可在无异步上下文时直接调用）。动作集：navigate / content / click / type / scroll。

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use headless_chrome::{Browser, Tab};
use serde_json::Value;

use crate::tools::search::extract_domain;
use crate::tools::Tool;

/// 会话级浏览器句柄：惰性启动，显式释放
#[derive(Default)]
pub struct BrowserHandle {
    browser: RwLock<Option<Browser>>,
    tab: RwLock<Option<Arc<Tab>>>,
}

impl BrowserHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 当前标签页；没有则启动浏览器并新建
    fn ensure_tab(&self) -> Result<Arc<Tab>, String> {
        if let Some(tab) = self.tab.read().map_err(|e| e.to_string())?.as_ref() {
            return Ok(Arc::clone(tab));
        }
        let mut browser_guard = self.browser.write().map_err(|e| e.to_string())?;
        if browser_guard.is_none() {
            let browser =
                Browser::default().map_err(|e| format!("Chrome launch failed: {}. Install Chrome/Chromium.", e))?;
            *browser_guard = Some(browser);
        }
        let tab = browser_guard
            .as_ref()
            .unwrap()
            .new_tab()
            .map_err(|e| format!("Browser tab failed: {}", e))?;
        *self.tab.write().map_err(|e| e.to_string())? = Some(Arc::clone(&tab));
        Ok(tab)
    }

    /// 释放浏览器进程；重复调用为 no-op。阻塞执行，无需异步上下文。
    pub fn release(&self) {
        if let Ok(mut tab) = self.tab.write() {
            tab.take();
        }
        let dropped = self
            .browser
            .write()
            .ok()
            .and_then(|mut guard| guard.take())
            .is_some();
        if dropped {
            tracing::info!("browser released");
        }
    }

    pub fn is_live(&self) -> bool {
        self.browser
            .read()
            .map(|g| g.is_some())
            .unwrap_or(false)
    }
}

impl crate::agent::session::SessionResource for BrowserHandle {
    fn name(&self) -> &str {
        "browser"
    }

    fn release(&self) {
        BrowserHandle::release(self);
    }
}

/// Browser 工具：navigate / content / click / type / scroll
pub struct BrowserTool {
    handle: Arc<BrowserHandle>,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

impl BrowserTool {
    pub fn new(handle: Arc<BrowserHandle>, allowed_domains: Vec<String>, max_result_chars: usize) -> Self {
        let allowed_domains = allowed_domains
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        Self {
            handle,
            allowed_domains,
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

    fn truncate(&self, text: String) -> String {
        if text.chars().count() > self.max_result_chars {
            text.chars().take(self.max_result_chars).collect::<String>() + "\n...[truncated]"
        } else {
            text
        }
    }
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        "browser"
    }

    fn description(&self) -> &str {
        r#"Drive a headless browser for pages that need rendering or interaction.

Actions:
- navigate: {"action": "navigate", "url": "https://..."} — open URL, return readable page text
- content:  {"action": "content", "selector": "optional CSS"} — text of current page or element
- click:    {"action": "click", "selector": "CSS selector"}
- type:     {"action": "type", "selector": "CSS selector", "text": "..."}
- scroll:   {"action": "scroll", "direction": "down"} (or "up")"#
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["navigate", "content", "click", "type", "scroll"] },
                "url": { "type": "string", "description": "URL for navigate" },
                "selector": { "type": "string", "description": "CSS selector for content/click/type" },
                "text": { "type": "string", "description": "Text for type" },
                "direction": { "type": "string", "enum": ["up", "down"], "description": "Direction for scroll" }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let action = args
            .get("action")
            .and_then(|v| v.as_str())
            .unwrap_or("content")
            .to_string();
        let handle = Arc::clone(&self.handle);

        match action.as_str() {
            "navigate" => {
                let url = args.get("url").and_then(|v| v.as_str()).unwrap_or("").trim().to_string();
                if url.is_empty() {
                    return Err("Missing url".to_string());
                }
                self.is_allowed(&url)?;
                tracing::info!(url = %url, "browser navigate");

                let text = tokio::task::spawn_blocking(move || {
                    let tab = handle.ensure_tab()?;
                    tab.navigate_to(&url).map_err(|e| format!("Navigate failed: {}", e))?;
                    tab.wait_for_element("body")
                        .map_err(|e| format!("Page load failed: {}", e))?;
                    let content = tab
                        .get_content()
                        .map_err(|e| format!("Get content failed: {}", e))?;
                    Ok::<_, String>(
                        html2text::from_read(content.as_bytes(), 120).unwrap_or(content),
                    )
                })
                .await
                .map_err(|e| format!("Task join: {}", e))??;

                Ok(self.truncate(text))
            }

            "content" => {
                let selector = args.get("selector").and_then(|v| v.as_str()).map(String::from);
                let text = tokio::task::spawn_blocking(move || {
                    let tab = handle.ensure_tab()?;
                    let text = if let Some(sel) = selector {
                        tab.wait_for_element(&sel)
                            .map_err(|e| format!("Element not found: {}", e))?
                            .get_inner_text()
                            .map_err(|e| format!("Get text failed: {}", e))?
                    } else {
                        let content = tab
                            .get_content()
                            .map_err(|e| format!("Get content failed: {}", e))?;
                        html2text::from_read(content.as_bytes(), 120).unwrap_or(content)
                    };
                    Ok::<_, String>(text)
                })
                .await
                .map_err(|e| format!("Task join: {}", e))??;

                Ok(self.truncate(text))
            }

            "click" => {
                let selector = args
                    .get("selector")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "Missing selector".to_string())?
                    .to_string();
                let result = tokio::task::spawn_blocking(move || {
                    let tab = handle.ensure_tab()?;
                    tab.wait_for_element(&selector)
                        .map_err(|e| format!("Element not found: {}", e))?
                        .click()
                        .map_err(|e| format!("Click failed: {}", e))?;
                    Ok::<_, String>(format!("Clicked {}", selector))
                })
                .await
                .map_err(|e| format!("Task join: {}", e))??;
                Ok(result)
            }

            "type" => {
                let selector = args
                    .get("selector")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "Missing selector".to_string())?
                    .to_string();
                let text = args.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let result = tokio::task::spawn_blocking(move || {
                    let tab = handle.ensure_tab()?;
                    let element = tab
                        .wait_for_element(&selector)
                        .map_err(|e| format!("Element not found: {}", e))?;
                    element.click().map_err(|e| format!("Focus failed: {}", e))?;
                    tab.type_str(&text).map_err(|e| format!("Type failed: {}", e))?;
                    Ok::<_, String>(format!("Typed into {}", selector))
                })
                .await
                .map_err(|e| format!("Task join: {}", e))??;
                Ok(result)
            }

            "scroll" => {
                let direction = args
                    .get("direction")
                    .and_then(|v| v.as_str())
                    .unwrap_or("down")
                    .to_string();
                let result = tokio::task::spawn_blocking(move || {
                    let tab = handle.ensure_tab()?;
                    let amount = if direction == "up" { -500 } else { 500 };
                    tab.evaluate(&format!("window.scrollBy(0, {})", amount), false)
                        .map_err(|e| format!("Scroll failed: {}", e))?;
                    Ok::<_, String>(format!("Scrolled {}", direction))
                })
                .await
                .map_err(|e| format!("Task join: {}", e))??;
                Ok(result)
            }

            other => Err(format!("Unknown browser action: {}", other)),
        }
    }
}
