//! Language and embedding model capabilities
//!
//! Timeouts and transient-error retries belong to implementations of these
//! traits; callers only see the final outcome.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelResult;

/// Per-call inference options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl InferOptions {
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// `Infer(prompt) -> text`
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn infer(&self, prompt: &str, options: &InferOptions) -> ModelResult<String>;

    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// `Embed(text) -> vector`
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, text: &str) -> ModelResult<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> ModelResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for std::sync::Arc<T> {
    async fn infer(&self, prompt: &str, options: &InferOptions) -> ModelResult<String> {
        (**self).infer(prompt, options).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

#[async_trait]
impl<T: EmbeddingModel + ?Sized> EmbeddingModel for std::sync::Arc<T> {
    async fn embed(&self, text: &str) -> ModelResult<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> ModelResult<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }
}
