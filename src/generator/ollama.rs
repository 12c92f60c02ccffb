/// Generator backed by a local Ollama instance (`POST /api/generate`).
///
/// Non-streaming. Connection errors, 429 and 5xx are retried with the same
/// backoff as the embedder; a timeout is not retried.
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::{GenerationError, Generator};
use crate::config::{ConfigError, GeneratorConfig};

pub struct OllamaGenerator {
    client: Client,
    url: String,
    max_retries: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &str, model_id: &str) -> Result<String, GenerationError> {
        let prompt_chars = prompt.chars().count();
        let unavailable = |message: String| GenerationError::Unavailable {
            message,
            prompt_chars,
        };

        let body = serde_json::json!({
            "model": model_id,
            "prompt": prompt,
            "stream": false,
        });
        let endpoint = format!("{}/api/generate", self.url);
        info!("Generating with '{model_id}' ({prompt_chars} prompt chars)");

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                thread::sleep(Duration::from_secs(1 << (attempt - 1).min(5)));
            }

            let response = match self.client.post(&endpoint).json(&body).send() {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    return Err(GenerationError::Timeout { prompt_chars });
                }
                Err(e) => {
                    warn!("Ollama generate attempt {} failed: {e}", attempt + 1);
                    last_err = Some(unavailable(format!(
                        "is Ollama running at {}? {e}",
                        self.url
                    )));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed: GenerateResponse = response.json().map_err(|e| {
                    if e.is_timeout() {
                        GenerationError::Timeout { prompt_chars }
                    } else {
                        GenerationError::Malformed {
                            reason: e.to_string(),
                            prompt_chars,
                        }
                    }
                })?;
                return Ok(parsed.response);
            }

            let body_text = response.text().unwrap_or_default();
            let err = unavailable(format!("{}: {body_text}", status.as_u16()));
            if status.as_u16() == 429 || status.is_server_error() {
                warn!("Ollama generate attempt {} failed: {err}", attempt + 1);
                last_err = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_err.unwrap_or_else(|| unavailable("generation failed after retries".into())))
    }
}
