//! Mock model capabilities for tests
//!
//! - [`MockLanguageModel`] answers by prompt-substring routing and records every
//!   prompt it sees.
//! - [`MockEmbeddingModel`] produces deterministic bag-of-words vectors, so
//!   texts sharing words are similar and similarity rankings are predictable.
//!
//! # Example
//!
//! ```ignore
//! use lexigraph_core::test_support::mocks::MockLanguageModel;
//! use lexigraph_core::traits::{InferOptions, LanguageModel};
//!
//! # async fn example() {
//! let model = MockLanguageModel::new();
//! model.respond_when(&["topics", "Berlin"], "topic: Cities\nproposition: Berlin is big");
//!
//! let answer = model
//!     .infer("Extract topics from: Berlin ...", &InferOptions::default())
//!     .await
//!     .unwrap();
//! assert!(answer.starts_with("topic: Cities"));
//! assert_eq!(model.call_count(), 1);
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ModelError, ModelResult};
use crate::ids::get_hash;
use crate::traits::{EmbeddingModel, InferOptions, LanguageModel};

// ============================================================================
// MockLanguageModel
// ============================================================================

#[derive(Debug, Clone)]
struct Route {
    patterns: Vec<String>,
    outcome: ModelResult<String>,
}

/// Language model that routes prompts to canned responses
///
/// Routes are checked in registration order; the first route whose patterns
/// all occur in the prompt wins. Unrouted prompts get the default response.
#[derive(Debug, Clone)]
pub struct MockLanguageModel {
    routes: Arc<Mutex<Vec<Route>>>,
    default_response: Arc<Mutex<String>>,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self {
            routes: Arc::new(Mutex::new(Vec::new())),
            default_response: Arc::new(Mutex::new(String::new())),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Respond with `response` when every pattern occurs in the prompt
    pub fn respond_when(&self, patterns: &[&str], response: &str) {
        self.routes.lock().push(Route {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            outcome: Ok(response.to_string()),
        });
    }

    /// Fail with `error` when every pattern occurs in the prompt
    pub fn fail_when(&self, patterns: &[&str], error: ModelError) {
        self.routes.lock().push(Route {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            outcome: Err(error),
        });
    }

    pub fn set_default_response(&self, response: &str) {
        *self.default_response.lock() = response.to_string();
    }

    /// Prompts received so far, in call order
    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_history.lock().len()
    }

    /// Number of prompts containing `pattern`
    pub fn calls_containing(&self, pattern: &str) -> usize {
        self.call_history
            .lock()
            .iter()
            .filter(|p| p.contains(pattern))
            .count()
    }

    pub fn clear_history(&self) {
        self.call_history.lock().clear();
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn infer(&self, prompt: &str, _options: &InferOptions) -> ModelResult<String> {
        self.call_history.lock().push(prompt.to_string());

        let routed = self
            .routes
            .lock()
            .iter()
            .find(|route| route.patterns.iter().all(|p| prompt.contains(p.as_str())))
            .map(|route| route.outcome.clone());

        match routed {
            Some(outcome) => outcome,
            None => Ok(self.default_response.lock().clone()),
        }
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

// ============================================================================
// MockEmbeddingModel
// ============================================================================

/// Deterministic bag-of-words embeddings
///
/// Each lowercase alphanumeric word is hashed into one of `dimensions`
/// buckets; the count vector is L2-normalized.
#[derive(Debug, Clone)]
pub struct MockEmbeddingModel {
    dimensions: usize,
    fail_pattern: Arc<Mutex<Option<String>>>,
    call_count: Arc<Mutex<usize>>,
}

impl Default for MockEmbeddingModel {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MockEmbeddingModel {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            fail_pattern: Arc::new(Mutex::new(None)),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Fail with a transient error for texts containing `pattern`
    pub fn fail_when(&self, pattern: &str) {
        *self.fail_pattern.lock() = Some(pattern.to_string());
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }

    /// The vector `embed` returns for `text`
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = get_hash(&word.to_lowercase());
            let bucket = usize::from_str_radix(&hash[..8], 16).unwrap_or(0) % self.dimensions;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbeddingModel {
    async fn embed(&self, text: &str) -> ModelResult<Vec<f32>> {
        *self.call_count.lock() += 1;
        if let Some(pattern) = self.fail_pattern.lock().as_deref() {
            if text.contains(pattern) {
                return Err(ModelError::Transient(format!(
                    "mock embedding failure for '{pattern}'"
                )));
            }
        }
        Ok(self.vector_for(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
