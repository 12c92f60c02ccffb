/// Embedder backed by a local Ollama instance (`POST /api/embed`).
///
/// Transient failures (connection errors, 429, 5xx) are retried with
/// exponential backoff: 1s, 2s, 4s, ... capped at 32s.
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::warn;

use super::{Embedder, EmbedderError, check_dimensions};
use crate::config::{ConfigError, EmbedderConfig};

pub struct OllamaEmbedder {
    client: Client,
    url: String,
    model: String,
    dimensions: usize,
    max_retries: u32,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    /// The HTTP client is built once and shared by every request, including
    /// those issued from the build worker pool.
    pub fn new(config: &EmbedderConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_retries: config.max_retries,
        })
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/api/embed", self.url);

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                thread::sleep(delay);
            }

            let response = match self.client.post(&endpoint).json(&body).send() {
                Ok(r) => r,
                Err(e) => {
                    warn!("Ollama embed attempt {} failed: {e}", attempt + 1);
                    last_err = Some(EmbedderError::Request(format!(
                        "is Ollama running at {}? {e}",
                        self.url
                    )));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed: EmbedResponse = response
                    .json()
                    .map_err(|e| EmbedderError::InvalidResponse(e.to_string()))?;
                return self.validate(parsed, texts.len());
            }

            let body_text = response.text().unwrap_or_default();
            let err = EmbedderError::Status {
                status: status.as_u16(),
                body: body_text,
            };
            if status.as_u16() == 429 || status.is_server_error() {
                warn!("Ollama embed attempt {} failed: {err}", attempt + 1);
                last_err = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_err
            .unwrap_or_else(|| EmbedderError::Request("embedding failed after retries".into())))
    }

    fn validate(
        &self,
        response: EmbedResponse,
        expected_len: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if response.embeddings.len() != expected_len {
            return Err(EmbedderError::InvalidResponse(format!(
                "expected {expected_len} embeddings, got {}",
                response.embeddings.len()
            )));
        }
        for vector in &response.embeddings {
            check_dimensions(vector, self.dimensions)?;
        }
        Ok(response.embeddings)
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.request(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InvalidResponse("empty embedding response".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
