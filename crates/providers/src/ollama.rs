//! Ollama provider implementation.
//!
//! Talks to the native Ollama HTTP API:
//! - `POST /api/chat` with `"stream": true`, answered as newline-delimited JSON
//! - `GET /api/tags` for model listing and the availability probe
//!
//! Transport failures are classified into timeout / connection refused /
//! host unresolved so callers can tell the user what to fix.

use async_trait::async_trait;
use futures::StreamExt;
use localcoder_config::BackendConfig;
use localcoder_core::error::ProviderError;
use localcoder_core::message::Message;
use localcoder_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A provider backed by a local (or remote) Ollama server.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    probe_timeout: Duration,
}

impl OllamaProvider {
    /// Create a provider with explicit timeouts.
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        connect_timeout: Duration,
        probe_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            probe_timeout,
        })
    }

    /// Create a provider from the `[backend]` config section.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ProviderError> {
        Self::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.probe_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to Ollama API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn chat_body(request: &ProviderRequest) -> serde_json::Value {
        let mut options = serde_json::json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            options["num_predict"] = serde_json::json!(max_tokens);
        }
        if !request.stop.is_empty() {
            options["stop"] = serde_json::json!(request.stop);
        }

        serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "stream": true,
            "options": options,
        })
    }

    async fn fetch_tags(&self, timeout: Option<Duration>) -> Result<TagsResponse, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &self.base_url))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status,
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("/api/tags: {e}")))
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::chat_body(&request);

        debug!(model = %request.model, messages = request.messages.len(), "Sending streaming chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &self.base_url))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Backend returned error");
            return Err(classify_status(status, &error_body, &request.model));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let base_url = self.base_url.clone();

        // Read the NDJSON byte stream and forward parsed chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            // Raw bytes: a multibyte character may straddle two network chunks
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let err = if e.is_timeout() {
                            ProviderError::Timeout(base_url.clone())
                        } else {
                            ProviderError::StreamInterrupted(e.to_string())
                        };
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                };

                buffer.extend_from_slice(&bytes);

                while let Some(line) = take_line(&mut buffer) {
                    let Some(parsed) = parse_chat_line(line.trim()) else {
                        continue;
                    };
                    let done = matches!(&parsed, Ok(chunk) if chunk.done) || parsed.is_err();
                    if tx.send(parsed).await.is_err() {
                        return; // receiver dropped
                    }
                    if done {
                        return;
                    }
                }
            }

            // Trailing line without newline
            let tail = String::from_utf8_lossy(&buffer);
            if let Some(parsed) = parse_chat_line(tail.trim()) {
                let done = matches!(&parsed, Ok(chunk) if chunk.done) || parsed.is_err();
                if tx.send(parsed).await.is_err() || done {
                    return;
                }
            }

            // Stream ended without a done marker
            let _ = tx.send(Ok(StreamChunk::done())).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let tags = self.fetch_tags(None).await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        self.fetch_tags(Some(self.probe_timeout)).await.map(|_| ())
    }
}

/// Remove and decode the first complete line of `buffer`, if any.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=end).collect();
    Some(String::from_utf8_lossy(&line[..end]).into_owned())
}

/// Parse one NDJSON line of a `/api/chat` stream.
///
/// Returns `None` for blank or unparseable lines.
fn parse_chat_line(line: &str) -> Option<Result<StreamChunk, ProviderError>> {
    if line.is_empty() {
        return None;
    }
    let resp: ChatStreamLine = match serde_json::from_str(line) {
        Ok(resp) => resp,
        Err(e) => {
            trace!(data = %line, error = %e, "Ignoring unparseable stream line");
            return None;
        }
    };

    if let Some(error) = resp.error {
        return Some(Err(ProviderError::StreamInterrupted(error)));
    }

    let usage = match (resp.prompt_eval_count, resp.eval_count) {
        (Some(prompt), Some(completion)) => Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }),
        _ => None,
    };

    Some(Ok(StreamChunk {
        content: resp
            .message
            .map(|m| m.content)
            .filter(|c| !c.is_empty()),
        done: resp.done,
        usage,
    }))
}

/// Map a non-200 response to a provider error.
fn classify_status(status: u16, body: &str, model: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.to_string());

    if status == 404 && message.to_lowercase().contains("not found") {
        return ProviderError::ModelNotFound(model.to_string());
    }
    ProviderError::ApiError {
        status_code: status,
        message,
    }
}

/// Map a reqwest transport error to an actionable provider error.
fn classify_transport_error(err: &reqwest::Error, base_url: &str) -> ProviderError {
    if err.is_timeout() {
        return ProviderError::Timeout(base_url.to_string());
    }
    if err.is_connect() {
        if mentions_dns_failure(&error_chain(err)) {
            return ProviderError::HostUnresolved(base_url.to_string());
        }
        return ProviderError::ConnectionRefused(base_url.to_string());
    }
    ProviderError::Network(err.to_string())
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(e) = source {
        parts.push(e.to_string());
        source = e.source();
    }
    parts.join(": ")
}

fn mentions_dns_failure(chain: &str) -> bool {
    let chain = chain.to_lowercase();
    [
        "dns error",
        "failed to lookup",
        "name or service not known",
        "nodename nor servname",
        "no such host",
        "temporary failure in name resolution",
    ]
    .iter()
    .any(|needle| chain.contains(needle))
}

/// Whether `wanted` is among the installed models. A bare name matches `:latest`.
pub fn model_available(models: &[String], wanted: &str) -> bool {
    models
        .iter()
        .any(|m| m == wanted || (!wanted.contains(':') && *m == format!("{wanted}:latest")))
}

// --- Ollama API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatStreamLine {
    #[serde(default)]
    message: Option<ApiMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}
