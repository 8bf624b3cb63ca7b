//! TOML configuration with environment overrides.
//!
//! Every field has a default, so a missing config file yields a working
//! local setup (Ollama on `127.0.0.1:11434`, Qdrant on `localhost:6333`).
//! After the file is parsed, well-known environment variables override
//! individual fields (see [`apply_env_overrides`]) and the result is
//! validated.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::chunk::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    /// Generative model used to answer questions.
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_generation_model(),
            embedding_model: default_embedding_model(),
            timeout_ms: default_timeout_ms(),
            embed_timeout_ms: default_embed_timeout_ms(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_generation_model() -> String {
    "llama3".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_embed_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct QdrantConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: String::new(),
            collection: default_collection(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_collection() -> String {
    "hr_documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Embedding requests in flight per window.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Points per upsert request.
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
    /// Chunks per progress super-batch.
    #[serde(default = "default_super_batch_size")]
    pub super_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            upsert_batch_size: default_upsert_batch_size(),
            super_batch_size: default_super_batch_size(),
        }
    }
}

fn default_concurrency() -> usize {
    5
}
fn default_upsert_batch_size() -> usize {
    50
}
fn default_super_batch_size() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
        }
    }
}

fn default_window_ms() -> u64 {
    60_000
}
fn default_max_requests() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// `development` or `production`.
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_max_question_chars")]
    pub max_question_chars: usize,
    /// CORS origins allowed in production. Development allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            environment: default_environment(),
            max_question_chars: default_max_question_chars(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_max_question_chars() -> usize {
    1000
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist, then apply environment overrides and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// [`load_config`] with an explicit variable lookup instead of the process
/// environment.
pub fn load_config_with<F>(path: &Path, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config, lookup)?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Override fields from environment-style variables.
///
/// `lookup` returns the value of a variable if set; production code passes
/// `std::env::var`, tests pass a map.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let text = |key: &str, field: &mut String| {
        if let Some(v) = lookup(key) {
            *field = v;
        }
    };
    text("OLLAMA_URL", &mut config.ollama.url);
    text("OLLAMA_MODEL", &mut config.ollama.model);
    text("EMBEDDING_MODEL", &mut config.ollama.embedding_model);
    text("QDRANT_URL", &mut config.qdrant.url);
    text("QDRANT_API_KEY", &mut config.qdrant.api_key);
    text("QDRANT_COLLECTION", &mut config.qdrant.collection);

    // NODE_ENV and PORT are fallbacks; APP_ENV and BIND_ADDR take precedence.
    if let Some(v) = lookup("NODE_ENV") {
        // Any other NODE_ENV value (test, staging) behaves as development.
        config.server.environment = if v == "production" { "production" } else { "development" }.to_string();
    }
    text("APP_ENV", &mut config.server.environment);
    if let Some(v) = lookup("PORT") {
        let port: u16 = parse_number("PORT", &v)?;
        let host = match config.server.bind.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => "0.0.0.0".to_string(),
        };
        config.server.bind = format!("{}:{}", host, port);
    }
    text("BIND_ADDR", &mut config.server.bind);

    if let Some(v) = lookup("OLLAMA_TIMEOUT") {
        config.ollama.timeout_ms = parse_number("OLLAMA_TIMEOUT", &v)?;
    }
    if let Some(v) = lookup("EMBEDDING_TIMEOUT") {
        config.ollama.embed_timeout_ms = parse_number("EMBEDDING_TIMEOUT", &v)?;
    }
    if let Some(v) = lookup("CHUNK_SIZE") {
        config.chunking.chunk_size = parse_number("CHUNK_SIZE", &v)?;
    }
    if let Some(v) = lookup("TOP_K_RESULTS") {
        config.retrieval.top_k = parse_number("TOP_K_RESULTS", &v)?;
    }
    if let Some(v) = lookup("RATE_LIMIT_WINDOW_MS") {
        config.rate_limit.window_ms = parse_number("RATE_LIMIT_WINDOW_MS", &v)?;
    }
    if let Some(v) = lookup("RATE_LIMIT_MAX_REQUESTS") {
        config.rate_limit.max_requests = parse_number("RATE_LIMIT_MAX_REQUESTS", &v)?;
    }
    if let Some(v) = lookup("ALLOWED_ORIGINS") {
        config.server.allowed_origins = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got '{}'", key, value))
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }

    if config.embedding.max_attempts == 0 {
        bail!("embedding.max_attempts must be >= 1");
    }

    if config.ingest.concurrency == 0
        || config.ingest.upsert_batch_size == 0
        || config.ingest.super_batch_size == 0
    {
        bail!("ingest.concurrency, ingest.upsert_batch_size and ingest.super_batch_size must be > 0");
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.rate_limit.window_ms == 0 || config.rate_limit.max_requests == 0 {
        bail!("rate_limit.window_ms and rate_limit.max_requests must be > 0");
    }

    if config.qdrant.collection.trim().is_empty() {
        bail!("qdrant.collection must not be empty");
    }

    match config.server.environment.as_str() {
        "development" | "production" => {}
        other => bail!(
            "Unknown server.environment: '{}'. Must be development or production.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.ollama.url, "http://127.0.0.1:11434");
        assert_eq!(config.ollama.embedding_model, "nomic-embed-text");
        assert_eq!(config.qdrant.collection, "hr_documents");
        assert_eq!(config.chunking.chunk_size, 400);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.ingest.concurrency, 5);
        assert_eq!(config.ingest.upsert_batch_size, 50);
        assert_eq!(config.ingest.super_batch_size, 500);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.rate_limit.max_requests, 20);
        assert!(!config.server.is_production());
        validate(&config).unwrap();
    }

    #[test]
    fn test_partial_sections() {
        let config = parse_config(
            r#"
[qdrant]
collection = "handbook"

[chunking]
chunk_size = 800
"#,
        )
        .unwrap();
        assert_eq!(config.qdrant.collection, "handbook");
        assert_eq!(config.qdrant.url, "http://localhost:6333");
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.overlap, 50);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OLLAMA_URL", "http://ollama:11434"),
            ("QDRANT_COLLECTION", "policies"),
            ("CHUNK_SIZE", "250"),
            ("TOP_K_RESULTS", "5"),
            ("APP_ENV", "production"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.ollama.url, "http://ollama:11434");
        assert_eq!(config.qdrant.collection, "policies");
        assert_eq!(config.chunking.chunk_size, 250);
        assert_eq!(config.retrieval.top_k, 5);
        assert!(config.server.is_production());
        assert_eq!(
            config.server.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_bad_numeric_env_rejected() {
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config, |k| {
            (k == "CHUNK_SIZE").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("CHUNK_SIZE"));
    }

    #[test]
    fn test_validation_rejects_zero_top_k() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_environment() {
        let mut config = Config::default();
        config.server.environment = "staging".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("staging"));
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse_config(include_str!("../config/rag.example.toml")).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.ollama.model, "llama3");
        assert!(config.server.allowed_origins.is_empty());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_with(&dir.path().join("absent.toml"), |_| None).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.qdrant.collection, "hr_documents");
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_load_config_applies_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag.toml");
        std::fs::write(&path, "[retrieval]\ntop_k = 4\n").unwrap();

        let config = load_config_with(&path, |k| (k == "QDRANT_COLLECTION").then(|| "faq".to_string())).unwrap();
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.qdrant.collection, "faq");

        let err = load_config_with(&path, |k| (k == "TOP_K_RESULTS").then(|| "0".to_string())).unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |k| pairs.iter().find(|(key, _)| *key == k).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_node_env_and_port_aliases() {

        let mut config = Config::default();
        apply_env_overrides(&mut config, lookup(&[("NODE_ENV", "production"), ("PORT", "8080")])).unwrap();
        assert!(config.server.is_production());
        assert_eq!(config.server.bind, "0.0.0.0:8080");

        let mut config = Config::default();
        apply_env_overrides(&mut config, lookup(&[("NODE_ENV", "test")])).unwrap();
        assert_eq!(config.server.environment, "development");

        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            lookup(&[
                ("NODE_ENV", "production"),
                ("APP_ENV", "development"),
                ("PORT", "8080"),
                ("BIND_ADDR", "127.0.0.1:4000"),
            ]),
        )
        .unwrap();
        assert!(!config.server.is_production());
        assert_eq!(config.server.bind, "127.0.0.1:4000");

        let mut config = Config::default();
        let err = apply_env_overrides(&mut config, lookup(&[("PORT", "70000")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
