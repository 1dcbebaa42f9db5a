//! HTTP transport for the chat backend.
//!
//! One-shot requests go through [`ChatBackend::send_message`]; streamed
//! responses are exposed as a finite async sequence of [`StreamChunk`]s
//! ending with exactly one terminal chunk (or one `Err`).

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use crate::decoder::FrameDecoder;
use crate::error::{ChatError, Result};
use crate::types::{ChatRequest, ChatResponse, HealthStatus, StreamChunk};

/// Finite stream of decoded chunks from one send
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

const DEFAULT_BASE_URL: &str = "http://localhost:5000/api/v1";
const EVENT_STREAM_MIME: &str = "text/event-stream";
const DISABLE_SYSTEM_PROXY_ENV: &str = "STREAMCHAT_DISABLE_SYSTEM_PROXY";

/// Transport seam between the session controller and the backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Single-shot completion
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Streamed completion
    fn send_message_stream(&self, request: &ChatRequest) -> ChunkStream;

    /// Backend liveness probe
    async fn check_health(&self) -> Result<HealthStatus>;
}

/// HTTP chat backend client
pub struct ChatApi {
    client: Client,
    base_url: String,
}

impl ChatApi {
    /// Create a client against the default local backend
    pub fn new() -> Self {
        Self {
            client: build_http_client(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set a custom backend base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn validate(request: &ChatRequest) -> Result<()> {
        if request.message.trim().is_empty() {
            return Err(ChatError::InvalidRequest("message is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&request.temperature) {
            return Err(ChatError::InvalidRequest(format!(
                "temperature {} is outside [0, 1]",
                request.temperature
            )));
        }
        Ok(())
    }
}

impl Default for ChatApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatBackend for ChatApi {
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse> {
        Self::validate(request)?;

        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(response_to_error(response).await);
        }

        Ok(response.json().await?)
    }

    fn send_message_stream(&self, request: &ChatRequest) -> ChunkStream {
        let client = self.client.clone();
        let url = format!("{}/chat/stream", self.base_url);
        let request = request.clone();

        Box::pin(async_stream::stream! {
            if let Err(e) = Self::validate(&request) {
                yield Err(e);
                return;
            }

            let response = match client
                .post(&url)
                .header(ACCEPT, EVENT_STREAM_MIME)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    yield Err(ChatError::Network(e));
                    return;
                }
            };

            if !response.status().is_success() {
                yield Err(response_to_error(response).await);
                return;
            }

            if !is_event_stream(&response) {
                yield Err(ChatError::StreamUnavailable);
                return;
            }

            let mut byte_stream = response.bytes_stream();
            let mut decoder = FrameDecoder::new();

            while let Some(fragment) = byte_stream.next().await {
                let fragment = match fragment {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ChatError::Network(e));
                        return;
                    }
                };

                for chunk in decoder.push(&fragment) {
                    yield Ok(chunk);
                }
                if decoder.is_finished() {
                    return;
                }
            }

            // End-of-stream without a terminal chunk: flush the residual and
            // let the decoder synthesize the implicit complete.
            for chunk in decoder.finish() {
                yield Ok(chunk);
            }
        })
    }

    async fn check_health(&self) -> Result<HealthStatus> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| ChatError::HealthCheck(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::HealthCheck(format!(
                "status {}",
                response.status().as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ChatError::HealthCheck(e.to_string()))
    }
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(EVENT_STREAM_MIME))
}

/// Map a non-success response to `RequestFailed`, capturing the server's
/// JSON body best-effort (empty object if unparseable).
async fn response_to_error(response: reqwest::Response) -> ChatError {
    let status = response.status().as_u16();
    let details = response
        .json::<Value>()
        .await
        .unwrap_or_else(|_| Value::Object(Default::default()));
    ChatError::RequestFailed { status, details }
}

fn build_http_client() -> Client {
    if std::env::var_os(DISABLE_SYSTEM_PROXY_ENV).is_some() || cfg!(test) {
        Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| Client::new())
    } else {
        Client::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatSettings;

    fn request(message: &str, temperature: f32) -> ChatRequest {
        let settings = ChatSettings {
            temperature,
            ..ChatSettings::default()
        };
        ChatRequest::new(message, vec![], &settings)
    }

    #[test]
    fn rejects_empty_message() {
        let result = ChatApi::validate(&request("   ", 0.5));
        assert!(matches!(result, Err(ChatError::InvalidRequest(_))));
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        assert!(ChatApi::validate(&request("hi", 1.5)).is_err());
        assert!(ChatApi::validate(&request("hi", -0.1)).is_err());
        assert!(ChatApi::validate(&request("hi", 0.0)).is_ok());
        assert!(ChatApi::validate(&request("hi", 1.0)).is_ok());
    }
}
