use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{NavError, NavResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> NavResult<LlmResponse> {
        let body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
            "max_tokens": cfg.max_tokens,
        });

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            max_tokens = cfg.max_tokens,
            "sending LLM request"
        );
        tracing::trace!(body = %sanitized_body(&body), "request body (sanitized, base64 omitted)");

        let mut request = self.client.post(&self.api_base).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(NavError::LlmProvider(format!("{}: {}", status, err_body)));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Accumulate an SSE streaming response into a single reply.
    async fn handle_stream(&self, response: reqwest::Response) -> NavResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = SseAccumulator::default();

        while let Some(result) = byte_stream.next().await {
            if acc.feed(&result?) {
                break;
            }
        }
        let reply = acc.finish();

        tracing::info!(
            provider = %self.id,
            content_len = reply.content.len(),
            reasoning_len = reply.reasoning.len(),
            "LLM stream complete"
        );
        Ok(reply)
    }

    async fn handle_json(&self, response: reqwest::Response) -> NavResult<LlmResponse> {
        let json: serde_json::Value = response.json().await?;
        let content = extract_message_content(&json)?;

        tracing::info!(
            provider = %self.id,
            content_len = content.len(),
            "LLM JSON response received"
        );

        Ok(LlmResponse {
            content,
            reasoning: String::new(),
        })
    }
}

/// Splits streamed bytes into SSE lines and folds their deltas into a reply.
#[derive(Default)]
struct SseAccumulator {
    line_buf: Vec<u8>,
    reply: LlmResponse,
    done: bool,
}

impl SseAccumulator {
    /// Consume one network chunk. Returns true once the stream signalled done.
    fn feed(&mut self, bytes: &[u8]) -> bool {
        for &b in bytes {
            if self.done {
                break;
            }
            if b == b'\n' {
                let line = std::mem::take(&mut self.line_buf);
                self.apply_line(&line);
            } else {
                self.line_buf.push(b);
            }
        }
        self.done
    }

    /// Flush a trailing line that arrived without a newline.
    fn finish(mut self) -> LlmResponse {
        if !self.done && !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.apply_line(&line);
        }
        self.reply
    }

    fn apply_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match sse_parser::parse_sse_line(line) {
            Ok(Some(chunk)) => match chunk.kind {
                StreamChunkKind::Reasoning => self.reply.reasoning.push_str(&chunk.content),
                StreamChunkKind::Content => self.reply.content.push_str(&chunk.content),
                StreamChunkKind::Done => self.done = true,
            },
            Ok(None) => {}
            Err(e) => {
                tracing::debug!("SSE parse skipped: {e}");
            }
        }
    }
}

/// Pull `choices[0].message.content` out of a completion body.
fn extract_message_content(json: &serde_json::Value) -> NavResult<String> {
    if let Some(message) = json["error"]["message"].as_str() {
        return Err(NavError::LlmProvider(message.to_string()));
    }
    let message = &json["choices"][0]["message"];
    if message.is_null() {
        return Err(NavError::LlmProvider("response has no choices".into()));
    }
    // A null content (e.g. refusal) is treated as an empty reply.
    Ok(message["content"].as_str().unwrap_or("").to_string())
}

/// Serialize a request body for logging with image payloads replaced.
fn sanitized_body(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) != Some("image_url") {
                    continue;
                }
                if let Some(url) = part.get_mut("image_url").and_then(|i| i.get_mut("url")) {
                    *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}
