//! Azure OpenAI chat-completions client
//!
//! Speaks the OpenAI function-calling wire format.
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{
    Completion, CompletionBackend, CompletionRequest, FinishReason, Message, Role,
    ToolCallRequest, ToolDeclaration,
};
use crate::config::CompletionSettings;
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

/// Reusable Azure OpenAI client (connection-pooled)
pub struct AzureOpenAiClient {
    client: Client,
    api_key: Option<String>,
    url: String,
    temperature: f32,
    max_tokens: u32,
}

impl AzureOpenAiClient {
    pub fn new(settings: &CompletionSettings) -> Result<Self> {
        let (endpoint, deployment) = match (&settings.endpoint, &settings.deployment) {
            (Some(endpoint), Some(deployment)) if settings.is_configured() => {
                (endpoint.trim_end_matches('/'), deployment.trim())
            }
            _ => {
                return Err(OrchestrationError::ConfigError(
                    "Azure OpenAI endpoint and deployment name are required".to_string(),
                ))
            }
        };

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, deployment, settings.api_version
            ),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    fn build_request<'a>(&self, request: CompletionRequest<'a>) -> ChatCompletionsRequest<'a> {
        ChatCompletionsRequest {
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: request
                .tools
                .filter(|tools| !tools.is_empty())
                .map(|tools| tools.iter().map(WireTool::function).collect()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl CompletionBackend for AzureOpenAiClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion> {
        let body = self.build_request(request);

        debug!(
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(Vec::len).unwrap_or(0),
            "Calling Azure OpenAI"
        );

        let mut http = self.client.post(&self.url).json(&body);
        if let Some(api_key) = &self.api_key {
            http = http.header("api-key", api_key);
        }

        let response = http.send().await.map_err(|e| {
            error!("Azure OpenAI request failed: {}", e);
            OrchestrationError::LlmError(format!("Azure OpenAI request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Azure OpenAI error response: {}", error_text);
            return Err(OrchestrationError::LlmError(format!(
                "Azure OpenAI returned {}: {}",
                status, error_text
            )));
        }

        let parsed: ChatCompletionsResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Azure OpenAI response: {}", e);
            OrchestrationError::LlmError(format!("Azure OpenAI parse error: {}", e))
        })?;

        let completion = parsed.into_completion()?;

        info!(
            finish_reason = ?completion.finish_reason,
            tool_calls = completion.tool_calls.len(),
            "Azure OpenAI response received"
        );

        Ok(completion)
    }
}

//
// ================= Wire Format =================
//

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let tool_calls: Vec<WireToolCall> =
            message.tool_calls.iter().map(WireToolCall::from).collect();

        // An assistant turn that only requests tools carries null content
        let content = if message.content.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(message.content.clone())
        };

        Self {
            role: message.role,
            content,
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDeclaration,
}

impl<'a> WireTool<'a> {
    fn function(declaration: &'a ToolDeclaration) -> Self {
        Self {
            kind: "function",
            function: declaration,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

impl From<&ToolCallRequest> for WireToolCall {
    fn from(call: &ToolCallRequest) -> Self {
        // Arguments go back to the model exactly as it produced them
        let arguments = match &call.arguments {
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };

        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

impl ChatCompletionsResponse {
    fn into_completion(self) -> Result<Completion> {
        let choice = self.choices.into_iter().next().ok_or_else(|| {
            OrchestrationError::LlmError("No choices in Azure OpenAI response".to_string())
        })?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(into_tool_call)
            .collect();

        Ok(Completion {
            content: choice.message.content,
            tool_calls,
            finish_reason: FinishReason::parse(choice.finish_reason.as_deref()),
        })
    }
}

/// Arguments that are not valid JSON are kept as the raw string, so the
/// tool registry can report them back to the model as invalid arguments.
fn into_tool_call(call: WireToolCall) -> ToolCallRequest {
    let arguments = if call.function.arguments.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str::<Value>(&call.function.arguments)
            .unwrap_or(Value::String(call.function.arguments))
    };

    let id = if call.id.is_empty() {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    } else {
        call.id
    };

    ToolCallRequest {
        id,
        name: call.function.name,
        arguments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolResult;
    use serde_json::json;

    fn configured() -> CompletionSettings {
        CompletionSettings {
            api_key: Some("secret".into()),
            ..CompletionSettings::default()
        }
        .with_endpoint("https://contoso.openai.azure.com/", "gpt-4o")
    }

    #[test]
    fn test_new_requires_configuration() {
        assert!(AzureOpenAiClient::new(&CompletionSettings::default()).is_err());

        let client = AzureOpenAiClient::new(&configured()).unwrap();
        assert_eq!(
            client.url,
            "https://contoso.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn test_request_serialization_with_tool_round() {
        let client = AzureOpenAiClient::new(&configured()).unwrap();
        let call = ToolCallRequest::new("call_1", "approve_expense", json!({"expenseId": 3}));
        let messages = vec![
            Message::system("You are helpful"),
            Message::user("approve 3"),
            Message::assistant_tool_calls(None, vec![call]),
            Message::tool_result(&ToolResult {
                tool_call_id: "call_1".into(),
                text: "{\"expenseId\":3}".into(),
            }),
        ];
        let declarations = vec![ToolDeclaration {
            name: "approve_expense".into(),
            description: "Approve".into(),
            parameters: json!({"type": "object"}),
        }];

        let body = client.build_request(CompletionRequest {
            messages: &messages,
            tools: Some(&declarations),
        });
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["messages"][2]["role"], "assistant");
        assert!(value["messages"][2]["content"].is_null());
        assert_eq!(
            value["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"expenseId\":3}"
        );
        assert_eq!(value["messages"][3]["role"], "tool");
        assert_eq!(value["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "approve_expense");
        assert_eq!(value["max_tokens"], 800);
    }

    #[test]
    fn test_request_without_tools_omits_field() {
        let client = AzureOpenAiClient::new(&configured()).unwrap();
        let messages = vec![Message::user("hi")];
        let body = client.build_request(CompletionRequest {
            messages: &messages,
            tools: None,
        });
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn test_response_with_tool_calls() {
        let response: ChatCompletionsResponse = serde_json::from_value(json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "get_expenses_by_status", "arguments": "{\"status\":\"Draft\"}"}},
                        {"id": "", "type": "function",
                         "function": {"name": "create_expense", "arguments": "{not json"}}
                    ]
                }
            }]
        }))
        .unwrap();

        let completion = response.into_completion().unwrap();
        assert_eq!(completion.finish_reason, FinishReason::ToolCalls);
        assert_eq!(completion.tool_calls.len(), 2);
        assert_eq!(completion.tool_calls[0].arguments, json!({"status": "Draft"}));
        assert_eq!(completion.tool_calls[1].arguments, json!("{not json"));
        assert!(completion.tool_calls[1].id.starts_with("call_"));
    }

    #[test]
    fn test_response_without_choices_is_error() {
        let response: ChatCompletionsResponse =
            serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(response.into_completion().is_err());
    }
}
