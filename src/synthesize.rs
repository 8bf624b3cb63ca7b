//! Grounded answer synthesis.
//!
//! Retrieved chunks are joined with blank lines into one context block and
//! wrapped in a prompt that restricts the model to that context. When
//! retrieval found nothing, the generator is not called at all and a canned
//! reply is returned instead.

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

/// Returned without calling the model when retrieval produced no context.
pub const INSUFFICIENT_CONTEXT_ANSWER: &str = "I don't have enough context to answer that question. Please try rephrasing or ask about topics covered in the handbook.";

/// A remote generative model (non-streaming).
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Liveness probe. Never errors.
    async fn health_check(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub context_found: bool,
    pub chunks_used: usize,
}

/// Build the grounding prompt for `question` over `chunks`.
pub fn build_prompt(question: &str, chunks: &[String]) -> String {
    let context = chunks.join("\n\n");
    format!(
        "You are an HR assistant. Answer ONLY using the context below. \
If the answer is not in the context, say \"I don't have information about that.\"\n\n\
Context:\n{}\n\n\
Question: {}\n\n\
Answer:",
        context, question
    )
}

pub async fn synthesize_answer(
    generator: &dyn Generator,
    question: &str,
    chunks: &[String],
) -> Result<Answer> {
    if chunks.is_empty() {
        debug!("no context retrieved, skipping generation");
        return Ok(Answer {
            text: INSUFFICIENT_CONTEXT_ANSWER.to_string(),
            context_found: false,
            chunks_used: 0,
        });
    }

    let prompt = build_prompt(question, chunks);
    let text = generator.generate(&prompt).await?;

    Ok(Answer {
        text,
        context_found: true,
        chunks_used: chunks.len(),
    })
}
