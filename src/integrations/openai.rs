//! OpenAI chat-completions client used to answer maintenance questions.

use std::env;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AnswerStream, Answerer};
use crate::config::OpenAISettings;
use crate::conversation::Message;
use crate::language::Language;
use crate::prompts::{self, Prompt};
use crate::{Error, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI client.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIClient {
    /// Create client from `OPENAI_API_KEY` and the configured model settings.
    pub fn from_env(settings: &OpenAISettings) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| Error::ConfigError("OPENAI_API_KEY not set".to_string()))?;
        Ok(Self::new(api_key)?.with_settings(settings))
    }

    /// Create client with API key and default model settings.
    pub fn new<S: Into<String>>(api_key: S) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::InvalidArgument("OPENAI_API_KEY is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent("fault_graph_assistant/0.1.0")
            .build()
            .map_err(|e| Error::InvalidArgument(format!("HTTP client error: {}", e)))?;

        let defaults = OpenAISettings::default();
        Ok(Self {
            http,
            api_key,
            base_url: OPENAI_API_URL.to_string(),
            model: defaults.model,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        })
    }

    pub fn with_settings(mut self, settings: &OpenAISettings) -> Self {
        self.model = settings.model.clone();
        self.temperature = settings.temperature;
        self.max_tokens = settings.max_tokens;
        if let Some(base_url) = &settings.base_url {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, messages: Vec<ChatMessage>, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    async fn post(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::OpenAiError(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::OpenAiError(format!("status {}: {}", status, text)));
        }
        Ok(response)
    }

    /// Chat completion.
    pub async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = self.request(messages, false);
        let text = self
            .post(&request)
            .await?
            .text()
            .await
            .map_err(|e| Error::OpenAiError(format!("Failed to read response: {}", e)))?;

        let chat_response: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| Error::OpenAiError(format!("Invalid response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::OpenAiError("Empty response from OpenAI".to_string()))
    }

    /// Streaming chat completion: yields content deltas as they arrive.
    pub async fn chat_completion_stream(&self, messages: Vec<ChatMessage>) -> Result<AnswerStream> {
        let request = self.request(messages, true);
        let response = self.post(&request).await?;

        let stream = async_stream::stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut lines = SseLines::default();
            let mut done = false;

            'read: while let Some(chunk) = bytes_stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(Error::OpenAiError(format!("stream interrupted: {}", e)));
                        return;
                    }
                };
                lines.push(&bytes);

                while let Some(line) = lines.next_line() {
                    let event = match line {
                        Ok(line) => parse_sse_line(&line),
                        Err(e) => SseEvent::Error(e),
                    };
                    match event {
                        SseEvent::Delta(text) => yield Ok(text),
                        SseEvent::Done => {
                            done = true;
                            break 'read;
                        }
                        SseEvent::Error(e) => {
                            yield Err(e);
                            return;
                        }
                        SseEvent::Skip => {}
                    }
                }
            }

            // Last line without a trailing newline.
            if !done {
                let event = match lines.finish() {
                    Some(Ok(line)) => parse_sse_line(&line),
                    Some(Err(e)) => SseEvent::Error(e),
                    None => SseEvent::Skip,
                };
                match event {
                    SseEvent::Delta(text) => yield Ok(text),
                    SseEvent::Done => done = true,
                    SseEvent::Error(e) => {
                        yield Err(e);
                        return;
                    }
                    SseEvent::Skip => {}
                }
            }

            if !done {
                yield Err(Error::OpenAiError("stream ended before [DONE]".to_string()));
            }
        };

        Ok(stream.boxed())
    }

    fn answer_messages(
        &self,
        history: &[Message],
        graph_context: &str,
        language: Language,
    ) -> Vec<ChatMessage> {
        let system = Prompt::MaintenanceAssistant.render(language);
        prompts::build_messages(&system, history, graph_context)
    }
}

#[async_trait]
impl Answerer for OpenAIClient {
    async fn generate(
        &self,
        history: &[Message],
        graph_context: &str,
        language: Language,
    ) -> Result<String> {
        let messages = self.answer_messages(history, graph_context, language);
        self.chat_completion(messages).await
    }

    async fn generate_stream(
        &self,
        history: &[Message],
        graph_context: &str,
        language: Language,
    ) -> Result<AnswerStream> {
        let messages = self.answer_messages(history, graph_context, language);
        self.chat_completion_stream(messages).await
    }
}

/// Splits an SSE byte stream into lines. Only complete lines are decoded,
/// so multi-byte characters split across network chunks stay intact.
#[derive(Debug, Default)]
struct SseLines {
    pending: Vec<u8>,
}

impl SseLines {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<Result<String>> {
        let newline = self.pending.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=newline).collect();
        Some(decode_line(line))
    }

    /// Whatever is left once the body has ended.
    fn finish(&mut self) -> Option<Result<String>> {
        if self.pending.is_empty() {
            return None;
        }
        Some(decode_line(std::mem::take(&mut self.pending)))
    }
}

fn decode_line(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| Error::OpenAiError(format!("Invalid UTF-8 in stream: {}", e)))
}

/// One parsed server-sent-events line.
#[derive(Debug)]
enum SseEvent {
    Delta(String),
    Done,
    Error(Error),
    Skip,
}

fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|text| !text.is_empty())
            .map(SseEvent::Delta)
            .unwrap_or(SseEvent::Skip),
        Err(e) => SseEvent::Error(Error::OpenAiError(format!("Invalid stream chunk: {}", e))),
    }
}

/// Chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
