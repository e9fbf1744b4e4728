use async_trait::async_trait;
use indexmap::IndexMap;

use super::client::ChatClient;
use super::error::BackendError;
use super::types::ChatMessage;
use super::{Translation, Translator};
use crate::config::ModelConfig;
use crate::data::TranslationPair;

/// Translates through the configured chat endpoints, one per model key.
pub struct HttpTranslator {
    client: ChatClient,
    models: IndexMap<String, ModelConfig>,
}

impl HttpTranslator {
    pub fn new(client: ChatClient, models: IndexMap<String, ModelConfig>) -> Self {
        Self { client, models }
    }
}

fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "zh" => "Chinese",
        "ja" => "Japanese",
        "fr" => "French",
        "de" => "German",
        other => other,
    }
}

/// Prompt for one pair. The reference translation is never shown to the model.
pub fn translation_messages(pair: &TranslationPair) -> Vec<ChatMessage> {
    let mut system = format!(
        "You are a professional technical translator. Translate the user's {} text into {}. \
         Reply with the translation only.",
        language_name(&pair.source_lang),
        language_name(&pair.target_lang),
    );
    if let Some(context) = &pair.context {
        system.push_str(&format!(" Context: {context}."));
    }
    vec![ChatMessage::system(system), ChatMessage::user(pair.source_text.clone())]
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        model: &str,
        pair: &TranslationPair,
    ) -> Result<Translation, BackendError> {
        let config = self
            .models
            .get(model)
            .ok_or_else(|| BackendError::UnknownModel(model.to_string()))?;

        let response = self.client.complete(config, translation_messages(pair)).await?;
        let text = response
            .text()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BackendError::ParseError("empty translation".into()))?
            .to_string();

        Ok(Translation {
            text,
            tokens_generated: response.completion_tokens(),
            is_local: config.local,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn models(base_url: String) -> IndexMap<String, ModelConfig> {
        let mut models = IndexMap::new();
        models.insert(
            "gemma".to_string(),
            ModelConfig {
                name: "Gemma".into(),
                base_url,
                model_id: "gemma-3-270m".into(),
                api_key: String::new(),
                local: true,
                temperature: 0.3,
                max_tokens: 512,
            },
        );
        models
    }

    #[test]
    fn prompt_names_languages_and_context() {
        let mut pair = TranslationPair::new("p1", "Torque the bolt.", "拧紧螺栓。");
        pair.context = Some("landing gear".into());
        let messages = translation_messages(&pair);
        assert!(messages[0].content.contains("English text into Chinese"));
        assert!(messages[0].content.contains("landing gear"));
        assert_eq!(messages[1].content, "Torque the bolt.");
        assert!(!messages.iter().any(|m| m.content.contains("拧紧螺栓")));
    }

    #[tokio::test]
    async fn translate_returns_text_and_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({"model": "gemma-3-270m"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "拧紧螺栓。"}}],
                "usage": {"prompt_tokens": 20, "completion_tokens": 6}
            })))
            .mount(&server)
            .await;

        let translator =
            HttpTranslator::new(ChatClient::new().unwrap(), models(format!("{}/v1", server.uri())));
        let pair = TranslationPair::new("p1", "Torque the bolt.", "拧紧螺栓。");
        let t = translator.translate("gemma", &pair).await.unwrap();
        assert_eq!(t.text, "拧紧螺栓。");
        assert_eq!(t.tokens_generated, 6);
        assert!(t.is_local);
    }

    #[tokio::test]
    async fn translate_unknown_model_fails() {
        let translator = HttpTranslator::new(ChatClient::new().unwrap(), IndexMap::new());
        let pair = TranslationPair::new("p1", "a", "b");
        let err = translator.translate("missing", &pair).await.unwrap_err();
        assert!(matches!(err, BackendError::UnknownModel(m) if m == "missing"));
    }

    #[tokio::test]
    async fn translate_rejects_empty_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "   "}}]
            })))
            .mount(&server)
            .await;

        let translator = HttpTranslator::new(ChatClient::new().unwrap(), models(server.uri()));
        let pair = TranslationPair::new("p1", "a", "b");
        assert!(matches!(
            translator.translate("gemma", &pair).await,
            Err(BackendError::ParseError(_))
        ));
    }
}
