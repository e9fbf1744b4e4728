//! Tipos de dados para o endpoint `chat/completions` compatível com OpenAI.
//!
//! Servidores locais (llama.cpp, MLX) e APIs remotas falam o mesmo formato,
//! então um único conjunto de structs atende aos dois casos.

use serde::{Deserialize, Serialize};

/// Corpo da requisição para `{base_url}/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Identificador do modelo no servidor.
    pub model: String,
    /// Mensagens que compõem a conversa.
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Número máximo de tokens na resposta.
    pub max_tokens: u32,
}

/// Uma única mensagem em uma conversa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Papel do remetente: "system", "user" ou "assistant".
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Resposta do endpoint `chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<Choice>,
    /// Nem todo servidor local reporta uso de tokens.
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    /// Texto da primeira escolha, sem espaços nas pontas.
    pub fn text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.trim())
    }

    pub fn completion_tokens(&self) -> u64 {
        self.usage.as_ref().map_or(0, |u| u.completion_tokens)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Estatísticas de consumo de tokens para uma chamada.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}
