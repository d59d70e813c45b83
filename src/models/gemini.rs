use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::traits::ModelClient;
use super::types::{ChatMessage, FragmentStream};
use crate::constants::{GEMINI_API_KEY_HEADER, HTTP_CONNECT_TIMEOUT_SECS};
use crate::utils::ModelError;

/// Client for the Gemini Generative Language API
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    /// Create a client against `base_url` (e.g. `https://generativelanguage.googleapis.com/v1beta`)
    ///
    /// `timeout` bounds a whole request, including reading a streamed body.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, model_id: &str, stream: bool) -> String {
        if stream {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, model_id
            )
        } else {
            format!("{}/models/{}:generateContent", self.base_url, model_id)
        }
    }

    /// POST the history and turn any non-2xx status into an API error
    async fn post(&self, url: &str, messages: &[ChatMessage]) -> Result<Response, ModelError> {
        let response = self
            .client
            .post(url)
            .header(GEMINI_API_KEY_HEADER, &self.api_key)
            .json(&request_body(messages))
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, model_id: &str, messages: &[ChatMessage]) -> Result<String, ModelError> {
        debug!(model = %model_id, messages = messages.len(), "Gemini generateContent request");

        let response = self.post(&self.endpoint(model_id, false), messages).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        parse_response(&value)
    }

    async fn generate_stream(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
    ) -> Result<FragmentStream, ModelError> {
        debug!(model = %model_id, messages = messages.len(), "Gemini streamGenerateContent request");

        let response = self.post(&self.endpoint(model_id, true), messages).await?;
        let status = response.status().as_u16();

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let lines = LinesStream::new(BufReader::new(StreamReader::new(bytes)).lines());

        let fragments = lines.filter_map(move |line| async move {
            match line {
                Ok(line) => parse_sse_line(&line, status),
                Err(e) => Some(Err(ModelError::Network(e.to_string()))),
            }
        });

        Ok(fragments.boxed())
    }
}

/// Build the `generateContent` request body from the history
pub(crate) fn request_body(messages: &[ChatMessage]) -> Value {
    let contents: Vec<Value> = messages
        .iter()
        .map(|msg| {
            json!({
                "role": msg.role.as_str(),
                "parts": [{ "text": msg.text }]
            })
        })
        .collect();

    json!({ "contents": contents })
}

/// Extract the reply text from a complete `generateContent` response
pub(crate) fn parse_response(value: &Value) -> Result<String, ModelError> {
    if let Some(message) = embedded_error(value) {
        return Err(ModelError::Parse(message));
    }

    let candidates = match value.get("candidates").and_then(Value::as_array) {
        Some(candidates) if !candidates.is_empty() => candidates,
        _ => {
            let reason = value
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str);
            return Err(ModelError::Parse(match reason {
                Some(reason) => format!("prompt blocked: {}", reason),
                None => "no candidates in response".to_string(),
            }));
        }
    };

    // A candidate without parts (e.g. stopped for safety) is an empty reply
    Ok(candidate_text(&candidates[0]))
}

/// Parse one SSE line of a streamed response into a fragment
///
/// Returns `None` for lines that carry no text (comments, blank lines, empty deltas).
pub(crate) fn parse_sse_line(line: &str, status: u16) -> Option<Result<String, ModelError>> {
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => return Some(Err(ModelError::Parse(e.to_string()))),
    };

    if let Some(message) = embedded_error(&value) {
        return Some(Err(ModelError::Api { status, message }));
    }

    let text = value
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .map(candidate_text)
        .unwrap_or_default();

    if text.is_empty() {
        None
    } else {
        Some(Ok(text))
    }
}

fn candidate_text(candidate: &Value) -> String {
    candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

fn embedded_error(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| error.to_string()),
    )
}

/// Pull a readable message out of an error body, falling back to the raw text
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| embedded_error(&value))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty error response".to_string()
            } else {
                trimmed.to_string()
            }
        })
}
