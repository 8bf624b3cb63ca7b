//! # RAG Gateway
//!
//! Retrieval-augmented question answering over a single document.
//!
//! Offline, a document is chunked, embedded with a local Ollama model and
//! stored in a Qdrant collection. Online, a question is embedded, the
//! closest chunks are retrieved, and a generative model answers from those
//! chunks only.
//!
//! ## Architecture
//!
//! ```text
//!  document ──▶ ┌─────────┐   ┌───────────┐   ┌──────────┐
//!               │ Chunker │──▶│ Embedding │──▶│  Qdrant  │
//!               └─────────┘   │  (Ollama) │   │  index   │
//!                             └─────┬─────┘   └────┬─────┘
//!                                   │              │
//!  question ──▶ ┌───────────┐ ◀─────┴──────────────┘
//!               │ Retriever │──▶ Synthesizer (Ollama) ──▶ answer
//!               └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`chunk`] | Paragraph/sentence-aware text chunking |
//! | [`config`] | TOML configuration with env overrides |
//! | [`embedding`] | Embedding backend trait, retry policy, cosine similarity |
//! | [`error`] | Error taxonomy with codes and HTTP statuses |
//! | [`index`] | Vector index trait, Qdrant and in-memory backends |
//! | [`ingest`] | Ingestion state machine |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`models`] | Chunks, vectors, points, retrieval results |
//! | [`ollama`] | Ollama embed/generate client |
//! | [`pipeline`] | Validate → retrieve → synthesize |
//! | [`progress`] | Ingestion progress reporters |
//! | [`rate_limit`] | Sliding-window limiter |
//! | [`retrieve`] | Query-time retrieval with lazy initialization |
//! | [`server`] | HTTP API |
//! | [`synthesize`] | Grounding prompt and answer generation |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod ollama;
pub mod pipeline;
pub mod progress;
pub mod rate_limit;
pub mod retrieve;
pub mod server;
pub mod synthesize;
