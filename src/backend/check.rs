//! Quick one-pair check of translation models before a full job.
//!
//! Each model translates the same pair once. The result records how long the
//! call took and a rough quality verdict: whether the call failed, whether the
//! model just echoed the source, or whether the output is in the wrong script.

use std::time::Instant;

use serde::Serialize;

use super::Translator;
use crate::data::TranslationPair;
use crate::report::round2;

/// Rough verdict on a single translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Ok,
    Error,
    /// Output equals the source text.
    Untranslated,
    /// Output does not use the target language's script.
    WrongLanguage,
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quality::Ok => write!(f, "ok"),
            Quality::Error => write!(f, "error"),
            Quality::Untranslated => write!(f, "untranslated"),
            Quality::WrongLanguage => write!(f, "wrong language"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCheck {
    pub model: String,
    pub success: bool,
    pub translated_text: String,
    /// Seconds, rounded to 2 decimals.
    pub processing_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub quality: Quality,
}

/// Built-in pair used when no dataset is given.
pub fn sample_pair() -> TranslationPair {
    let mut pair = TranslationPair::new(
        "check_sample",
        "This chapter defines the aircraft dimensions and areas for maintenance operations.",
        "本章定义了维修操作中的飞机尺寸和区域。",
    );
    pair.category = Some("technical_manual".to_string());
    pair.context = Some("Aircraft maintenance manual".to_string());
    pair
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Only Chinese targets are checked for script; anything else passes.
fn uses_target_script(target_lang: &str, text: &str) -> bool {
    let chinese = target_lang == "zh" || target_lang.starts_with("zh-");
    !chinese || text.chars().any(is_cjk)
}

pub fn assess(pair: &TranslationPair, translated: &str) -> Quality {
    if translated.trim() == pair.source_text.trim() {
        Quality::Untranslated
    } else if !uses_target_script(&pair.target_lang, translated) {
        Quality::WrongLanguage
    } else {
        Quality::Ok
    }
}

pub async fn check_model(
    translator: &dyn Translator,
    model: &str,
    pair: &TranslationPair,
) -> ModelCheck {
    let started = Instant::now();
    let result = translator.translate(model, pair).await;
    let processing_time = round2(started.elapsed().as_secs_f64());

    match result {
        Ok(translation) => {
            let quality = assess(pair, &translation.text);
            tracing::debug!(model = %model, %quality, seconds = processing_time, "Model check finished");
            ModelCheck {
                model: model.to_string(),
                success: true,
                translated_text: translation.text,
                processing_time,
                error_message: None,
                quality,
            }
        }
        Err(e) => {
            tracing::warn!(model = %model, error = %e, "Model check failed");
            ModelCheck {
                model: model.to_string(),
                success: false,
                translated_text: String::new(),
                processing_time,
                error_message: Some(e.to_string()),
                quality: Quality::Error,
            }
        }
    }
}

/// Check each model in turn with the same pair.
pub async fn check_models(
    translator: &dyn Translator,
    models: &[String],
    pair: &TranslationPair,
) -> Vec<ModelCheck> {
    let mut checks = Vec::with_capacity(models.len());
    for model in models {
        checks.push(check_model(translator, model, pair).await);
    }
    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, EchoTranslator, Translation};
    use async_trait::async_trait;

    /// Replies per model: "echo" returns the reference, "parrot" the source,
    /// "english" an English sentence, anything else fails.
    struct ScriptedTranslator;

    #[async_trait]
    impl Translator for ScriptedTranslator {
        async fn translate(
            &self,
            model: &str,
            pair: &TranslationPair,
        ) -> Result<Translation, BackendError> {
            let text = match model {
                "echo" => return EchoTranslator.translate(model, pair).await,
                "parrot" => pair.source_text.clone(),
                "english" => "The chapter covers aircraft dimensions.".to_string(),
                other => return Err(BackendError::UnknownModel(other.to_string())),
            };
            Ok(Translation {
                text,
                tokens_generated: 8,
                is_local: false,
            })
        }
    }

    #[tokio::test]
    async fn checks_report_quality_per_model() {
        let pair = sample_pair();
        let models: Vec<String> = ["echo", "parrot", "english", "missing"]
            .iter()
            .map(|m| m.to_string())
            .collect();
        let checks = check_models(&ScriptedTranslator, &models, &pair).await;

        let verdicts: Vec<_> = checks.iter().map(|c| (c.model.as_str(), c.quality)).collect();
        assert_eq!(
            verdicts,
            vec![
                ("echo", Quality::Ok),
                ("parrot", Quality::Untranslated),
                ("english", Quality::WrongLanguage),
                ("missing", Quality::Error),
            ]
        );
        assert!(checks[0].success);
        assert_eq!(checks[0].translated_text, pair.target_text);
        assert!(!checks[3].success);
        assert!(checks[3].translated_text.is_empty());
        assert!(checks[3].error_message.as_deref().unwrap().contains("missing"));
        assert!(checks.iter().all(|c| c.processing_time >= 0.0));
    }

    #[test]
    fn non_chinese_targets_skip_script_check() {
        let mut pair = TranslationPair::new("p1", "Open the door.", "Ouvrez la porte.");
        pair.target_lang = "fr".to_string();
        assert_eq!(assess(&pair, "Ouvrez la porte."), Quality::Ok);
        assert_eq!(assess(&pair, "  Open the door. "), Quality::Untranslated);

        pair.target_lang = "zh-CN".to_string();
        assert_eq!(assess(&pair, "Ouvrez la porte."), Quality::WrongLanguage);
        assert_eq!(assess(&pair, "打开门。"), Quality::Ok);
    }

    #[test]
    fn quality_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(Quality::WrongLanguage).unwrap(),
            "wrong_language"
        );
    }
}
