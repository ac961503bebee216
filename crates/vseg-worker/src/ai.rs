//! Client for an OpenAI-compatible transcription and analysis service.
//!
//! Two calls per job: the audio track goes to the transcription endpoint,
//! then the timed transcript and the window boundaries go to a chat model
//! that answers with per-window scores. Each call is retried on its own.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use vseg_models::Window;

use crate::config::ScorerConfig;
use crate::retry::{retry_async, RetryConfig};

/// Errors from the AI service.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI service not configured")]
    NotConfigured,

    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse AI response: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AiError {
    /// Transport failures, rate limiting and server errors are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::Http(_) => true,
            AiError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Timed transcript returned by the transcription endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Transcript {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Transcript {
    /// Transcript text overlapping `[start, end)`.
    pub fn text_between(&self, start: f64, end: f64) -> String {
        self.segments
            .iter()
            .filter(|s| s.end > start && s.start < end)
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Structured answer of the analysis call.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Analysis {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub segments: Vec<WindowAnalysis>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowAnalysis {
    pub index: u32,
    pub score: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

const SYSTEM_PROMPT: &str = "You rate short video segments for how engaging they are as \
standalone clips. Answer with a JSON object only.";

/// OpenAI-compatible API client.
#[derive(Clone)]
pub struct AiClient {
    client: Client,
    api_key: String,
    base_url: String,
    transcribe_model: String,
    analysis_model: String,
    language: Option<String>,
    retry: RetryConfig,
}

impl AiClient {
    /// Build a client; fails with `NotConfigured` when no API key is set.
    pub fn new(config: &ScorerConfig) -> Result<Self, AiError> {
        let api_key = config.api_key.clone().ok_or(AiError::NotConfigured)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            transcribe_model: config.transcribe_model.clone(),
            analysis_model: config.analysis_model.clone(),
            language: config.language.clone(),
            retry: RetryConfig::new("ai_request").with_max_retries(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Transcribe an audio file.
    pub async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, AiError> {
        let audio = tokio::fs::read(audio_path).await?;
        let url = format!("{}/audio/transcriptions", self.base_url);
        let retry = RetryConfig {
            operation_name: "transcription".to_string(),
            ..self.retry.clone()
        };

        let transcript = retry_async(&retry, AiError::is_retryable, || {
            let audio = audio.clone();
            let url = url.clone();
            async move {
                let part = Part::bytes(audio)
                    .file_name("audio.mp3")
                    .mime_str("audio/mpeg")?;
                let mut form = Form::new()
                    .part("file", part)
                    .text("model", self.transcribe_model.clone())
                    .text("response_format", "verbose_json");
                if let Some(language) = &self.language {
                    form = form.text("language", language.clone());
                }

                let response = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .multipart(form)
                    .send()
                    .await?;
                let body = check_status(response).await?;
                serde_json::from_str::<Transcript>(&body).map_err(|e| AiError::Parse(e.to_string()))
            }
        })
        .await
        .into_result()?;

        info!(
            chars = transcript.text.len(),
            segments = transcript.segments.len(),
            "Transcription complete"
        );
        Ok(transcript)
    }

    /// Ask the analysis model to score each window.
    pub async fn analyze(&self, transcript: &Transcript, windows: &[Window]) -> Result<Analysis, AiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let prompt = build_prompt(transcript, windows);
        let retry = RetryConfig {
            operation_name: "analysis".to_string(),
            ..self.retry.clone()
        };

        let content = retry_async(&retry, AiError::is_retryable, || {
            let request = ChatRequest {
                model: &self.analysis_model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: SYSTEM_PROMPT.to_string(),
                    },
                    ChatMessage {
                        role: "user",
                        content: prompt.clone(),
                    },
                ],
                response_format: ResponseFormat { kind: "json_object" },
                temperature: 0.3,
            };
            let url = url.clone();
            async move {
                let response = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&request)
                    .send()
                    .await?;
                let body = check_status(response).await?;
                let chat: ChatResponse =
                    serde_json::from_str(&body).map_err(|e| AiError::Parse(e.to_string()))?;
                chat.choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| AiError::Parse("No content in analysis response".to_string()))
            }
        })
        .await
        .into_result()?;

        let analysis = parse_analysis(&content)?;
        debug!(
            scored = analysis.segments.len(),
            windows = windows.len(),
            "Analysis complete"
        );
        Ok(analysis)
    }
}

async fn check_status(response: reqwest::Response) -> Result<String, AiError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AiError::Status {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        });
    }
    Ok(body)
}

fn build_prompt(transcript: &Transcript, windows: &[Window]) -> String {
    let mut prompt = String::from(
        "Score each segment from 0 to 10 and pick one category from: \
highlight, educational, entertainment, trivia, content. Give a short reason.\n\
Respond as {\"summary\": string, \"segments\": [{\"index\": number, \"score\": number, \
\"category\": string, \"reason\": string}]}.\n\nSegments:\n",
    );
    for window in windows {
        let text = transcript.text_between(window.start_sec, window.end_sec);
        let text = if text.is_empty() { "(no speech)".to_string() } else { text };
        prompt.push_str(&format!(
            "{} [{:.0}s-{:.0}s]: {}\n",
            window.index, window.start_sec, window.end_sec, text
        ));
    }
    prompt
}

/// Parse model output, tolerating a surrounding markdown code fence.
pub fn parse_analysis(content: &str) -> Result<Analysis, AiError> {
    let text = content.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);

    serde_json::from_str(text.trim()).map_err(|e| AiError::Parse(e.to_string()))
}
