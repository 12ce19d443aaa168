//! Ollama provider — local model inference over the `/api/chat` endpoint.
//!
//! Features:
//! - Tool calling via the chat API's `tools` parameter
//! - Streaming via NDJSON (one JSON object per line)
//! - Tool calls are emitted to the agent only once fully assembled; a call
//!   split across stream fragments is buffered here, never surfaced partial

use async_trait::async_trait;
use futures::StreamExt;
use roost_core::error::ProviderError;
use roost_core::message::{Message, MessageToolCall, Role};
use roost_core::provider::{
    Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition, Usage,
};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

const DEFAULT_HOST: &str = "http://127.0.0.1:11434";

pub struct OllamaProvider {
    client: reqwest::Client,
    host: String,
}

impl OllamaProvider {
    pub fn new(host: impl Into<String>, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            host: host.into(),
        }
    }

    pub fn localhost() -> Self {
        Self::new(DEFAULT_HOST, Duration::from_secs(120))
    }

    fn to_api_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                    Role::Tool => "tool",
                };
                let mut obj = json!({
                    "role": role,
                    "content": m.content,
                });
                if !m.tool_calls.is_empty() {
                    let calls: Vec<Value> = m
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            let arguments: Value = serde_json::from_str(&tc.arguments)
                                .unwrap_or_else(|_| json!({}));
                            json!({
                                "function": {
                                    "name": tc.name,
                                    "arguments": arguments,
                                }
                            })
                        })
                        .collect();
                    obj["tool_calls"] = json!(calls);
                }
                obj
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    fn build_body(request: &ProviderRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "stream": stream,
            "options": { "temperature": request.temperature },
        });
        if let Some(max_tokens) = request.max_tokens {
            body["options"]["num_predict"] = json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(Self::to_api_tools(&request.tools));
        }
        body
    }

    /// Extract completed tool calls from a response `message` object.
    /// Ollama delivers arguments as a JSON object; we carry them as the
    /// serialized string the domain type expects and mint correlation ids,
    /// which the API does not provide.
    fn extract_tool_calls(message: &Value) -> Vec<MessageToolCall> {
        let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) else {
            return Vec::new();
        };
        calls
            .iter()
            .filter_map(|call| {
                let function = call.get("function")?;
                let name = function.get("name")?.as_str()?.to_string();
                let arguments = function
                    .get("arguments")
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "{}".into());
                Some(MessageToolCall {
                    id: format!("call_{}", Uuid::new_v4()),
                    name,
                    arguments,
                })
            })
            .collect()
    }

    fn extract_usage(payload: &Value) -> Option<Usage> {
        let prompt = payload.get("prompt_eval_count")?.as_u64()? as u32;
        let completion = payload.get("eval_count").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        })
    }

    fn map_send_error(e: reqwest::Error) -> ProviderError {
        if e.is_connect() {
            ProviderError::Unavailable(e.to_string())
        } else if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else {
            ProviderError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/api/chat", self.host);
        let body = Self::build_body(&request, false);

        debug!(provider = "ollama", model = %request.model, "Sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status,
                message,
            });
        }

        let payload: Value = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("failed to parse response: {e}"),
        })?;

        let api_message = &payload["message"];
        let mut message = Message::assistant(
            api_message
                .get("content")
                .and_then(|c| c.as_str())
                .unwrap_or(""),
        );
        message.tool_calls = Self::extract_tool_calls(api_message);

        Ok(ProviderResponse {
            message,
            usage: Self::extract_usage(&payload),
            model: payload
                .get("model")
                .and_then(|m| m.as_str())
                .unwrap_or(&request.model)
                .to_string(),
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let url = format!("{}/api/chat", self.host);
        let body = Self::build_body(&request, true);

        debug!(provider = "ollama", model = %request.model, "Sending streaming chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status,
                message,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            // Tool calls accumulate across fragments and are surfaced only
            // on the terminal chunk, fully assembled.
            let mut tool_calls: Vec<MessageToolCall> = Vec::new();
            let mut usage: Option<Usage> = None;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() {
                        continue;
                    }

                    let payload: Value = match serde_json::from_str(&line) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, line = %line, "Ignoring unparseable NDJSON line");
                            continue;
                        }
                    };

                    if let Some(message) = payload.get("message") {
                        if let Some(text) = message.get("content").and_then(|c| c.as_str()) {
                            if !text.is_empty()
                                && tx
                                    .send(Ok(StreamChunk {
                                        content: Some(text.to_string()),
                                        tool_calls: Vec::new(),
                                        done: false,
                                        usage: None,
                                    }))
                                    .await
                                    .is_err()
                            {
                                return;
                            }
                        }
                        tool_calls.extend(Self::extract_tool_calls(message));
                    }

                    if payload.get("done").and_then(|d| d.as_bool()) == Some(true) {
                        usage = Self::extract_usage(&payload);
                        let _ = tx
                            .send(Ok(StreamChunk {
                                content: None,
                                tool_calls: std::mem::take(&mut tool_calls),
                                done: true,
                                usage: usage.take(),
                            }))
                            .await;
                        return;
                    }
                }
            }

            // Stream ended without a done marker — still terminate cleanly
            // so a turn never hangs on a dropped connection.
            let _ = tx
                .send(Ok(StreamChunk {
                    content: None,
                    tool_calls,
                    done: true,
                    usage,
                }))
                .await;
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/api/tags", self.host);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => Err(ProviderError::Unavailable(e.to_string())),
        }
    }
}
