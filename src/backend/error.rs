//! Tipos de erro para os colaboradores de tradução e avaliação.
//!
//! Define [`BackendError`] com variantes para rate limiting, erros da API,
//! erros de rede e respostas que não puderam ser interpretadas. Usa `thiserror`
//! para derivar `Display` e `Error` a partir dos atributos `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer ao chamar um modelo de tradução ou de avaliação.
///
/// Um erro aqui afeta apenas uma unidade de trabalho (par, modelo); o job
/// continua com o próximo modelo ou par.
#[derive(Debug, Error)]
pub enum BackendError {
    /// O servidor retornou HTTP 429 (rate limit).
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pela API (ex.: 401 chave inválida, 500 erro interno).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// O modelo pedido não está configurado.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// A resposta chegou mas não tem o formato esperado.
    #[error("failed to parse response: {0}")]
    ParseError(String),
}
