use async_trait::async_trait;
use serde::Deserialize;

use super::client::ChatClient;
use super::error::BackendError;
use super::types::ChatMessage;
use super::{Evaluation, Evaluator, Translation};
use crate::config::ModelConfig;
use crate::data::TranslationPair;
use crate::job::Scores;

/// Scores translations by asking a judge model for a JSON verdict.
pub struct LlmEvaluator {
    client: ChatClient,
    model: ModelConfig,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    accuracy: Option<f64>,
    fluency: Option<f64>,
    terminology: Option<f64>,
    overall: Option<f64>,
}

impl LlmEvaluator {
    pub fn new(client: ChatClient, model: ModelConfig) -> Self {
        Self { client, model }
    }
}

pub fn evaluation_messages(pair: &TranslationPair, translation: &Translation) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You grade technical translations. Respond with ONLY valid JSON, no other text.\n\
             Format: {\"accuracy\": <0-10>, \"fluency\": <0-10>, \"terminology\": <0-10>, \
             \"overall\": <0-10>, \"comments\": \"<short reason>\"}",
        ),
        ChatMessage::user(format!(
            "Source: {}\nReference: {}\nCandidate: {}",
            pair.source_text, pair.target_text, translation.text
        )),
    ]
}

/// Pull the JSON object out of a judge reply, tolerating code fences and chatter.
pub fn parse_verdict(text: &str) -> Result<Evaluation, BackendError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => return Err(BackendError::ParseError(format!("no JSON object in: {text}"))),
    };

    let details: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| BackendError::ParseError(format!("invalid verdict JSON: {e}")))?;
    let verdict: Verdict = serde_json::from_value(details.clone())
        .map_err(|e| BackendError::ParseError(format!("unexpected verdict shape: {e}")))?;

    Ok(Evaluation {
        scores: Scores {
            accuracy: verdict.accuracy,
            fluency: verdict.fluency,
            terminology: verdict.terminology,
            overall: verdict.overall,
        },
        details: Some(details),
    })
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        pair: &TranslationPair,
        translation: &Translation,
    ) -> Result<Evaluation, BackendError> {
        let response = self
            .client
            .complete(&self.model, evaluation_messages(pair, translation))
            .await?;
        let text = response
            .text()
            .ok_or_else(|| BackendError::ParseError("empty verdict".into()))?;
        parse_verdict(text)
    }
}
