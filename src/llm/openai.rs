//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。工具调用走原生
//! function calling：注册表的工具声明绑定为 functions，模型返回的 tool_calls 携带
//! id，据此做请求/结果关联；工具结果以 tool 角色消息回传。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{AssistantReply, ChatModel, ToolSpec};
use crate::memory::{Message, ToolRequest};

/// OpenAI 兼容客户端：持有 Client 与 model 名
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChat {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    fn to_request_messages(
        &self,
        instructions: Option<&str>,
        history: &[Message],
    ) -> Vec<ChatCompletionRequestMessage> {
        let mut out = Vec::with_capacity(history.len() + 1);

        // 指令槽解析为首条 system 消息
        if let Some(system) = instructions {
            out.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system.to_string())
                    .build()
                    .unwrap(),
            ));
        }

        for msg in history {
            match msg {
                Message::User(u) => out.push(ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(u.clone())
                        .build()
                        .unwrap(),
                )),
                Message::AgentText(t) => out.push(ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(t.clone())
                        .build()
                        .unwrap(),
                )),
                Message::AgentToolRequest(reqs) => {
                    let calls: Vec<ChatCompletionMessageToolCalls> = reqs
                        .iter()
                        .map(|r| {
                            ChatCompletionMessageToolCalls::Function(
                                ChatCompletionMessageToolCall {
                                    id: r.id.clone(),
                                    function: FunctionCall {
                                        name: r.name.clone(),
                                        arguments: r.args.to_string(),
                                    },
                                },
                            )
                        })
                        .collect();
                    out.push(ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .tool_calls(calls)
                            .build()
                            .unwrap(),
                    ));
                }
                Message::ToolResult(outcome) => out.push(ChatCompletionRequestMessage::Tool(
                    ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(outcome.request_id.clone())
                        .content(outcome.content.clone())
                        .build()
                        .unwrap(),
                )),
                // 评估者反馈以 assistant 角色回放（与原始会话形态一致）
                Message::Evaluator(f) => out.push(ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(format!("Feedback from the evaluator: {}", f))
                        .build()
                        .unwrap(),
                )),
            }
        }
        out
    }

    fn to_tool_declarations(&self, tools: &[ToolSpec]) -> Result<Vec<ChatCompletionTools>, String> {
        tools
            .iter()
            .map(|spec| {
                let function = FunctionObjectArgs::default()
                    .name(spec.name.clone())
                    .description(spec.description.clone())
                    .parameters(spec.parameters.clone())
                    .build()
                    .map_err(|e| e.to_string())?;
                Ok(ChatCompletionTools::Function(ChatCompletionTool { function }))
            })
            .collect()
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(
        &self,
        instructions: Option<&str>,
        history: &[Message],
        tools: &[ToolSpec],
    ) -> Result<AssistantReply, String> {
        let messages = self.to_request_messages(instructions, history);

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&self.model).messages(messages);
        if !tools.is_empty() {
            builder.tools(self.to_tool_declarations(tools)?);
        }
        let request = builder.build().map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| "Empty completion: no choices".to_string())?;

        if let Some(calls) = choice.message.tool_calls.filter(|c| !c.is_empty()) {
            let requests = calls
                .into_iter()
                .map(|c| match c {
                    ChatCompletionMessageToolCalls::Function(f) => ToolRequest {
                        id: f.id,
                        name: f.function.name,
                        // arguments 为 JSON 字符串；解析失败时原样透传给工具报错
                        args: serde_json::from_str(&f.function.arguments)
                            .unwrap_or(serde_json::Value::Null),
                    },
                    ChatCompletionMessageToolCalls::Custom(c) => ToolRequest {
                        id: c.id,
                        name: c.custom_tool.name,
                        args: serde_json::from_str(&c.custom_tool.input)
                            .unwrap_or(serde_json::Value::Null),
                    },
                })
                .collect();
            return Ok(AssistantReply::ToolRequests(requests));
        }

        let content = choice.message.content.unwrap_or_default();
        Ok(AssistantReply::Text(content))
    }
}
