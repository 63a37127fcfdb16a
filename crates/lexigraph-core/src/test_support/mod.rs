//! Test doubles for the model capabilities
//!
//! Compiled for this crate's own tests and, behind the `test-utils` feature,
//! for downstream crates' tests.

pub mod mocks;

pub use mocks::{MockEmbeddingModel, MockLanguageModel};
