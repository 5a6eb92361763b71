use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info, warn };
use reqwest::{ Client as HttpClient, Response, header::{ HeaderMap, HeaderValue, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };
use serde_json::{ json, Value };
use std::str::Utf8Error;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::{ create_streaming_response, ChatClient, ChunkStream, Completion, StreamChunk };
use crate::error::RelayError;
use crate::llm::LlmConfig;
use crate::models::chat::{ Role, Turn };
use crate::models::relay::SENTINEL;
use crate::sse::{ data_payload, LineBuffer };

pub struct OpenAIChatClient {
    http: HttpClient,
    endpoint: String,
    model: String,
    request_timeout: Duration,
    idle_timeout: Duration,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OpenAIStreamEvent {
    Chunk {
        choices: Vec<OpenAIStreamChoice>,
    },
    Error {
        error: OpenAIErrorDetail,
    },
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
}

#[derive(Deserialize, Default)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIErrorBody {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    #[serde(default)]
    message: String,
}

/// What a single upstream line means to the relay.
#[derive(Debug, PartialEq)]
enum StreamLine {
    Chunk(StreamChunk),
    /// In-band error event sent by the provider.
    Failure(String),
    /// A data line that does not match the expected shape.
    Noise(String),
}

fn parse_stream_line(line: &str) -> Option<StreamLine> {
    let payload = data_payload(line)?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == SENTINEL {
        return Some(StreamLine::Chunk(StreamChunk::sentinel()));
    }
    match serde_json::from_str::<OpenAIStreamEvent>(payload) {
        Ok(OpenAIStreamEvent::Chunk { choices }) => {
            let delta_content = choices.into_iter().next().and_then(|choice| choice.delta.content);
            Some(StreamLine::Chunk(StreamChunk { delta_content, is_final: false }))
        }
        Ok(OpenAIStreamEvent::Error { error }) => Some(StreamLine::Failure(error.message)),
        Err(e) => Some(StreamLine::Noise(e.to_string())),
    }
}

fn transport_error(e: reqwest::Error) -> RelayError {
    if e.is_timeout() { RelayError::Timeout } else { RelayError::Http(e) }
}

async fn upstream_error_detail(resp: Response) -> String {
    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<OpenAIErrorBody>(&text) {
        Ok(body) if !body.error.message.is_empty() => body.error.message,
        _ => text.chars().take(512).collect(),
    }
}

/// Forwards one upstream line. Returns `false` once the task should stop reading.
async fn forward_line(
    tx: &mpsc::Sender<Result<StreamChunk, RelayError>>,
    line: Result<String, Utf8Error>
) -> bool {
    let line = match line {
        Ok(line) => line,
        Err(e) => {
            let _ = tx.send(Err(RelayError::Upstream(format!("invalid UTF-8 in stream: {}", e)))).await;
            return false;
        }
    };

    match parse_stream_line(&line) {
        None => true,
        Some(StreamLine::Chunk(chunk)) => {
            if chunk.is_final {
                let _ = tx.send(Ok(chunk)).await;
                return false;
            }
            match &chunk.delta_content {
                Some(content) if !content.is_empty() => tx.send(Ok(chunk)).await.is_ok(),
                _ => true,
            }
        }
        Some(StreamLine::Failure(message)) => {
            let _ = tx.send(Err(RelayError::Upstream(message))).await;
            false
        }
        Some(StreamLine::Noise(e)) => {
            warn!("Skipping unparseable upstream line: {} ({})", line, e);
            true
        }
    }
}

impl OpenAIChatClient {
    pub fn new(
        endpoint: String,
        model: String,
        request_timeout: Duration,
        idle_timeout: Duration
    ) -> Result<Self, RelayError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            endpoint,
            model,
            request_timeout,
            idle_timeout,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, RelayError> {
        Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            config.request_timeout,
            config.idle_timeout
        )
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, api_key: &str, turns: &[Turn]) -> Result<Completion, RelayError> {
        let req = OpenAIChatRequest {
            model: &self.model,
            messages: turns,
            stream: None,
        };

        info!("Sending standard request upstream ({} turns)", turns.len());
        let resp = self.http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .timeout(self.request_timeout)
            .json(&req)
            .send().await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let detail = upstream_error_detail(resp).await;
            return Err(RelayError::Upstream(format!("status {}: {}", status, detail)));
        }

        let parsed = resp
            .json::<OpenAIResponse>().await
            .map_err(|e| RelayError::Upstream(format!("malformed completion payload: {}", e)))?;

        let message = parsed.choices
            .into_iter()
            .next()
            .ok_or_else(|| RelayError::Upstream("completion has no choices".to_string()))?
            .message;
        let content = message.content.ok_or_else(||
            RelayError::Upstream("completion message has no content".to_string())
        )?;

        info!("Response received from upstream");
        Ok(Completion {
            message: Turn {
                role: message.role.unwrap_or(Role::Assistant),
                content,
            },
            usage: parsed.usage.unwrap_or_else(|| json!({})),
        })
    }

    async fn complete_stream(
        &self,
        api_key: &str,
        turns: &[Turn]
    ) -> Result<ChunkStream, RelayError> {
        let req = OpenAIChatRequest {
            model: &self.model,
            messages: turns,
            stream: Some(true),
        };
        let request = self.http.post(&self.endpoint).bearer_auth(api_key).json(&req);
        let idle = self.idle_timeout;

        info!("Sending streaming request upstream ({} turns)", turns.len());
        Ok(
            create_streaming_response(move |tx| async move {
                let sent = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Caller went away before upstream answered");
                        return;
                    }
                    sent = timeout(idle, request.send()) => sent,
                };
                let resp = match sent {
                    Err(_) => {
                        let _ = tx.send(Err(RelayError::Timeout)).await;
                        return;
                    }
                    Ok(Err(e)) => {
                        let _ = tx.send(Err(transport_error(e))).await;
                        return;
                    }
                    Ok(Ok(resp)) => resp,
                };

                let status = resp.status();
                if !status.is_success() {
                    let detail = upstream_error_detail(resp).await;
                    let _ = tx.send(
                        Err(RelayError::Upstream(format!("status {}: {}", status, detail)))
                    ).await;
                    return;
                }

                debug!("Upstream stream opened");
                let mut body = resp.bytes_stream();
                let mut lines = LineBuffer::default();

                loop {
                    let next = tokio::select! {
                        _ = tx.closed() => {
                            info!("Caller disconnected, closing upstream stream");
                            return;
                        }
                        next = timeout(idle, body.next()) => next,
                    };

                    match next {
                        Err(_) => {
                            let _ = tx.send(Err(RelayError::Timeout)).await;
                            return;
                        }
                        Ok(None) => {
                            break;
                        }
                        Ok(Some(Err(e))) => {
                            let _ = tx.send(Err(transport_error(e))).await;
                            return;
                        }
                        Ok(Some(Ok(bytes))) => {
                            lines.push(&bytes);
                            while let Some(line) = lines.next_line() {
                                if !forward_line(&tx, line).await {
                                    return;
                                }
                            }
                        }
                    }
                }

                if let Some(line) = lines.take_remainder() {
                    forward_line(&tx, line).await;
                }
            })
        )
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }
}
