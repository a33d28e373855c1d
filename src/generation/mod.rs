//! Client for the hosted generation model.
//!
//! Prompts are sent as an ordered list of text and image parts. Images are encoded as PNG and
//! attached inline, so the model sees them in the same position the prompt assembler put them.

use crate::config::Config;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::io::Cursor;
use thiserror::Error;

/// Errors surfaced while calling the generation model.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// HTTP layer failed before receiving a response.
    #[error("Generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Model endpoint returned an error status.
    #[error("Generation model returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the endpoint.
        status: reqwest::StatusCode,
        /// Response body.
        body: String,
    },
    /// An image part could not be encoded.
    #[error("Failed to encode image part: {0}")]
    ImageEncoding(String),
}

/// One element of a multi-part prompt.
#[derive(Debug, Clone)]
pub enum PromptPart {
    /// Plain text.
    Text(String),
    /// An image shown to the model.
    Image(DynamicImage),
}

impl PromptPart {
    /// Convenience constructor for text parts.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

/// Interface implemented by generation backends.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Send `parts` to the model. `Ok(None)` means the model produced no text.
    async fn generate(&self, parts: Vec<PromptPart>) -> Result<Option<String>, GenerationError>;
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiClient {
    /// Construct a client for `model` served under `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            http: Client::builder().user_agent("docqa/generate").build()?,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// Build the client described by the configuration.
    pub fn from_config(config: &Config) -> Result<Self, GenerationError> {
        tracing::debug!(model = %config.generation_model, "Initializing generation client");
        Self::new(
            config.generation_base_url.clone(),
            config.generation_model.clone(),
            config.google_api_key.clone(),
        )
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim_start_matches("models/");
        format!(
            "{}/v1beta/models/{model}:generateContent",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, parts: Vec<PromptPart>) -> Result<Option<String>, GenerationError> {
        let encoded = parts
            .into_iter()
            .map(encode_part)
            .collect::<Result<Vec<_>, _>>()?;
        let body = json!({
            "contents": [{ "role": "user", "parts": encoded }]
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::UnexpectedStatus { status, body });
        }

        let payload: GenerateContentResponse = response.json().await?;
        let text: String = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }
}

fn encode_part(part: PromptPart) -> Result<Value, GenerationError> {
    match part {
        PromptPart::Text(text) => Ok(json!({ "text": text })),
        PromptPart::Image(image) => {
            let mut buffer = Vec::new();
            image
                .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                .map_err(|error| GenerationError::ImageEncoding(error.to_string()))?;
            Ok(json!({
                "inlineData": {
                    "mimeType": "image/png",
                    "data": STANDARD.encode(buffer),
                }
            }))
        }
    }
}
