//! 推送通知工具：fire-and-forget
//!
//! 单条字符串消息 POST 到 Pushover 风格端点。投递失败只记日志不上抛；凭据缺失时
//! 跳过投递并明确告知。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::tools::Tool;

/// 通知工具：持有端点与凭据（来自环境变量）
pub struct NotifyTool {
    client: Client,
    endpoint: String,
    token: Option<String>,
    user: Option<String>,
}

impl NotifyTool {
    pub fn new(endpoint: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            token: std::env::var("PUSHOVER_API_TOKEN").ok(),
            user: std::env::var("PUSHOVER_USER_KEY").ok(),
        }
    }
}

#[async_trait]
impl Tool for NotifyTool {
    fn name(&self) -> &str {
        "push_notification"
    }

    fn description(&self) -> &str {
        "Send a push notification to the user. Args: {\"message\": \"...\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "description": "Notification text to deliver" }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let message = args.get("message").and_then(|v| v.as_str()).unwrap_or("").trim();
        if message.is_empty() {
            return Err("Missing message".to_string());
        }

        let (token, user) = match (&self.token, &self.user) {
            (Some(t), Some(u)) => (t.clone(), u.clone()),
            _ => {
                tracing::warn!("push notification skipped: credentials not configured");
                return Ok("Notification skipped: push credentials not configured".to_string());
            }
        };

        let result = self
            .client
            .post(&self.endpoint)
            .form(&[
                ("token", token.as_str()),
                ("user", user.as_str()),
                ("message", message),
            ])
            .send()
            .await;

        // 投递失败记日志，不作为工具错误上抛
        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("push notification delivered");
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "push notification delivery failed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "push notification delivery failed");
            }
        }
        Ok("Notification dispatched".to_string())
    }
}
