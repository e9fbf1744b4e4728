//! Collaborators that perform the actual translation and scoring.
//!
//! Job workers only see the [`Translator`] and [`Evaluator`] traits. Each call
//! is one unit of work that may fail on its own without touching job state.

pub mod check;
pub mod client;
pub mod error;
pub mod evaluator;
pub mod translator;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;

pub use check::{ModelCheck, Quality, check_models};
pub use client::ChatClient;
pub use error::BackendError;
pub use evaluator::LlmEvaluator;
pub use translator::HttpTranslator;

use crate::data::TranslationPair;
use crate::job::Scores;

/// Output of one translation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub text: String,
    /// Tokens the model generated, 0 when the backend does not say.
    pub tokens_generated: u64,
    /// Whether the model runs on a local endpoint.
    pub is_local: bool,
}

/// Output of one scoring call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub scores: Scores,
    pub details: Option<serde_json::Value>,
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, model: &str, pair: &TranslationPair)
    -> Result<Translation, BackendError>;
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        pair: &TranslationPair,
        translation: &Translation,
    ) -> Result<Evaluation, BackendError>;
}

/// Offline translator that echoes the reference text. Used by `demo`.
#[derive(Debug, Clone, Default)]
pub struct EchoTranslator;

#[async_trait]
impl Translator for EchoTranslator {
    async fn translate(
        &self,
        _model: &str,
        pair: &TranslationPair,
    ) -> Result<Translation, BackendError> {
        Ok(Translation {
            text: pair.target_text.clone(),
            tokens_generated: pair.target_text.chars().count() as u64,
            is_local: true,
        })
    }
}

/// Wraps a translator and sleeps before every call. Lets `demo` show pause
/// and resume on a job that would otherwise finish instantly.
#[derive(Debug, Clone)]
pub struct Throttled<T> {
    inner: T,
    delay: Duration,
}

impl<T> Throttled<T> {
    pub fn new(inner: T, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<T: Translator> Translator for Throttled<T> {
    async fn translate(
        &self,
        model: &str,
        pair: &TranslationPair,
    ) -> Result<Translation, BackendError> {
        tokio::time::sleep(self.delay).await;
        self.inner.translate(model, pair).await
    }
}

/// Offline evaluator that scores by exact match against the reference.
#[derive(Debug, Clone, Default)]
pub struct ExactMatchEvaluator;

#[async_trait]
impl Evaluator for ExactMatchEvaluator {
    async fn evaluate(
        &self,
        pair: &TranslationPair,
        translation: &Translation,
    ) -> Result<Evaluation, BackendError> {
        let score = if translation.text.trim() == pair.target_text.trim() {
            10.0
        } else {
            0.0
        };
        Ok(Evaluation {
            scores: Scores {
                accuracy: Some(score),
                fluency: Some(score),
                terminology: Some(score),
                overall: Some(score),
            },
            details: None,
        })
    }
}
