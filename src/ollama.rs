//! HTTP client for a local Ollama instance.
//!
//! Implements both [`EmbeddingBackend`] (`POST /api/embed`) and
//! [`Generator`] (`POST /api/generate`, non-streaming). Each call is a single
//! attempt; retries are layered on top by
//! [`EmbeddingClient`](crate::embedding::EmbeddingClient).
//!
//! Transport failures are classified so callers can tell a slow model from
//! a dead one:
//! - request timeout → [`GatewayError::Timeout`]
//! - connection refused, HTTP error status, malformed body → [`GatewayError::Unavailable`]

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OllamaConfig;
use crate::embedding::EmbeddingBackend;
use crate::error::{GatewayError, RemoteService, Result};
use crate::models::Embedding;
use crate::synthesize::Generator;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OllamaClient {
    http: reqwest::Client,
    url: String,
    model: String,
    embedding_model: String,
    embed_timeout: Duration,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            embed_timeout: Duration::from_millis(config.embed_timeout_ms),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, service: RemoteService, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout {
                service,
                message: format!("no response from Ollama at {}", self.url),
            }
        } else if err.is_connect() {
            GatewayError::Unavailable {
                service,
                message: format!("cannot connect to Ollama at {}. Is it running?", self.url),
            }
        } else {
            GatewayError::Unavailable {
                service,
                message: err.to_string(),
            }
        }
    }

    async fn post_json<B, R>(
        &self,
        service: RemoteService,
        path: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let mut request = self.http.post(format!("{}{}", self.url, path)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| self.classify(service, e))?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable {
                service,
                message: format!("Ollama API error {}: {}", status, body_text),
            });
        }

        response.json::<R>().await.map_err(|e| {
            if e.is_timeout() {
                self.classify(service, e)
            } else {
                GatewayError::Unavailable {
                    service,
                    message: format!("invalid Ollama response: {}", e),
                }
            }
        })
    }

    async fn ping(&self) -> bool {
        match self
            .http
            .get(format!("{}/api/tags", self.url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaClient {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed_once(&self, text: &str) -> Result<Embedding> {
        debug!(text_len = text.len(), model = %self.embedding_model, "generating embedding");
        let body = EmbedRequest {
            model: &self.embedding_model,
            input: text,
        };
        let parsed: EmbedResponse = self
            .post_json(RemoteService::Embedding, "/api/embed", &body, Some(self.embed_timeout))
            .await?;

        match parsed.embeddings.into_iter().next() {
            Some(vector) if !vector.is_empty() => Ok(Embedding::new(vector)),
            _ => Err(GatewayError::Unavailable {
                service: RemoteService::Embedding,
                message: "Ollama returned no embedding".to_string(),
            }),
        }
    }

    async fn health_check(&self) -> bool {
        self.ping().await
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(prompt_len = prompt.len(), model = %self.model, "generating response");
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let parsed: GenerateResponse = self
            .post_json(RemoteService::Generation, "/api/generate", &body, None)
            .await?;
        Ok(parsed.response)
    }

    async fn health_check(&self) -> bool {
        self.ping().await
    }
}
