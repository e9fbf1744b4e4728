//! Work items for evaluation jobs and the dataset format they are loaded from.
//!
//! A dataset is a JSON document with a top-level `translation_pairs` array.
//! [`DataSelection`] trims the loaded pairs to a prefix before a job starts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// One source/reference pair to translate and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationPair {
    pub id: String,
    pub source_text: String,
    pub target_text: String,
    #[serde(default = "default_source_lang")]
    pub source_lang: String,
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn default_source_lang() -> String {
    "en".to_string()
}

fn default_target_lang() -> String {
    "zh".to_string()
}

impl TranslationPair {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_text: source.into(),
            target_text: target.into(),
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            category: None,
            context: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Dataset {
    translation_pairs: Option<Vec<TranslationPair>>,
}

/// Parse a dataset document. A document without `translation_pairs` is rejected.
pub fn parse_dataset(json: &str) -> Result<Vec<TranslationPair>, EvalError> {
    let dataset: Dataset = serde_json::from_str(json)?;
    dataset
        .translation_pairs
        .ok_or_else(|| EvalError::Dataset("missing `translation_pairs` field".into()))
}

/// Read and parse a dataset file.
pub async fn load_dataset(path: &Path) -> Result<Vec<TranslationPair>, EvalError> {
    let contents = tokio::fs::read_to_string(path).await?;
    parse_dataset(&contents)
}

/// Which part of a dataset a job should cover.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum DataSelection {
    #[default]
    All,
    /// Leading share of the dataset, in percent.
    Percentage(f64),
    /// Leading number of pairs.
    Count(i64),
}

impl DataSelection {
    /// Apply the selection. Always keeps at least one pair of a non-empty
    /// dataset; non-positive values fall back to the whole dataset.
    pub fn apply(self, mut pairs: Vec<TranslationPair>) -> Vec<TranslationPair> {
        let total = pairs.len();
        let keep = match self {
            DataSelection::All => total,
            DataSelection::Percentage(p) if p > 0.0 => {
                let p = p.clamp(1.0, 100.0);
                ((total as f64 * p / 100.0) as usize).max(1)
            }
            DataSelection::Count(n) if n > 0 => (n as usize).clamp(1, total.max(1)),
            _ => total,
        };
        pairs.truncate(keep.min(total));
        pairs
    }
}
