//! Configuração do transeval carregada a partir de `transeval.toml`.
//!
//! A struct [`EvalConfig`] contém todos os parâmetros configuráveis e é
//! produzida uma única vez na inicialização. Valores ausentes no arquivo usam
//! defaults sensíveis. A variável de ambiente `TRANSEVAL_API_KEY` tem
//! precedência sobre o arquivo para as chaves de API.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::telemetry::DEFAULT_LOG_CAPACITY;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "transeval.toml";

/// Configuração de nível superior.
#[derive(Debug, Clone, Deserialize)]
pub struct EvalConfig {
    /// Diretório onde os relatórios de jobs concluídos são gravados.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Modelos de tradução disponíveis, por chave.
    #[serde(default)]
    pub models: IndexMap<String, ModelConfig>,

    /// Modelo usado para pontuar as traduções.
    #[serde(default)]
    pub evaluator: Option<ModelConfig>,

    /// Endpoints monitorados pelo amostrador de telemetria.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,

    /// Quantidade de eventos de log mantidos em memória.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

/// Parâmetros do amostrador de telemetria.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Intervalo entre amostras de CPU/memória.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Espera após uma falha de amostragem.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Tamanho máximo de cada histórico.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Timeout de cada verificação de saúde.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Endpoint verificado como `default` quando nenhum outro está registrado.
    #[serde(default)]
    pub default_endpoint: Option<String>,
}

/// Um modelo acessível por um endpoint compatível com OpenAI.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    /// Nome de exibição.
    #[serde(default)]
    pub name: String,

    /// URL base, incluindo o prefixo de versão (ex.: `http://127.0.0.1:8081/v1`).
    pub base_url: String,

    /// Identificador do modelo no servidor.
    pub model_id: String,

    #[serde(default)]
    pub api_key: String,

    /// Modelos locais alimentam também o agregado de throughput local.
    #[serde(default)]
    pub local: bool,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Endpoint nomeado para verificações de saúde.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
}

// Diretório padrão dos relatórios: "results".
fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

// Capacidade padrão do buffer de logs: 500 eventos.
fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

// Intervalo padrão de amostragem: 2000ms.
fn default_sample_interval_ms() -> u64 {
    2000
}

// Espera padrão após erro: 5000ms.
fn default_error_backoff_ms() -> u64 {
    5000
}

// Capacidade padrão do histórico: 100 amostras.
fn default_history_capacity() -> usize {
    100
}

// Timeout padrão das verificações de saúde: 2000ms.
fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1000
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            history_capacity: default_history_capacity(),
            probe_timeout_ms: default_probe_timeout_ms(),
            default_endpoint: None,
        }
    }
}

impl TelemetryConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            telemetry: TelemetryConfig::default(),
            models: IndexMap::new(),
            evaluator: None,
            endpoints: Vec::new(),
            log_capacity: default_log_capacity(),
        }
    }
}

impl EvalConfig {
    /// Carrega a configuração. Um caminho explícito (ex.: `--config`) tem
    /// precedência sobre `TRANSEVAL_CONFIG`, que tem precedência sobre
    /// `transeval.toml` no diretório atual. Usa valores padrão se o arquivo
    /// não existir.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit.map(Path::to_path_buf).unwrap_or_else(|| {
            std::env::var("TRANSEVAL_CONFIG")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
        });
        let mut config = Self::load_from(&path)?;

        if let Ok(key) = std::env::var("TRANSEVAL_API_KEY") {
            if !key.is_empty() {
                config.apply_api_key(&key);
            }
        }

        Ok(config)
    }

    /// Carrega um arquivo específico, sem aplicar variáveis de ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<EvalConfig>(&contents)?)
    }

    /// A chave do ambiente substitui a do avaliador e preenche modelos sem chave.
    pub fn apply_api_key(&mut self, key: &str) {
        if let Some(evaluator) = self.evaluator.as_mut() {
            evaluator.api_key = key.to_string();
        }
        for model in self.models.values_mut() {
            if model.api_key.is_empty() {
                model.api_key = key.to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = EvalConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("results"));
        assert_eq!(config.telemetry.sample_interval(), Duration::from_secs(2));
        assert_eq!(config.telemetry.error_backoff(), Duration::from_secs(5));
        assert_eq!(config.telemetry.history_capacity, 100);
        assert_eq!(config.telemetry.probe_timeout(), Duration::from_secs(2));
        assert!(config.models.is_empty());
        assert!(config.evaluator.is_none());
        assert_eq!(config.log_capacity, 500);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            output_dir = "out"

            [telemetry]
            history_capacity = 10

            [models.gemma-3-270m]
            base_url = "http://127.0.0.1:8081/v1"
            model_id = "gemma-3-270m"
            local = true

            [models.qwen3-8b]
            base_url = "https://api.example.com/v1"
            model_id = "qwen3-8b"
            api_key = "sk-file"

            [evaluator]
            name = "judge"
            base_url = "https://api.example.com/v1"
            model_id = "ernie-4.5"

            [[endpoints]]
            name = "gemma-3-270m"
            url = "http://127.0.0.1:8081"
        "#;
        let config: EvalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.telemetry.history_capacity, 10);
        assert_eq!(config.telemetry.sample_interval_ms, 2000);
        assert_eq!(
            config.models.keys().collect::<Vec<_>>(),
            vec!["gemma-3-270m", "qwen3-8b"]
        );
        let gemma = &config.models["gemma-3-270m"];
        assert!(gemma.local);
        assert_eq!(gemma.max_tokens, 1000);
        assert_eq!(config.evaluator.as_ref().unwrap().model_id, "ernie-4.5");
        assert_eq!(config.endpoints[0].url, "http://127.0.0.1:8081");
    }

    #[test]
    fn api_key_override_fills_blanks_only() {
        let mut config: EvalConfig = toml::from_str(
            r#"
            [models.a]
            base_url = "http://a/v1"
            model_id = "a"
            [models.b]
            base_url = "http://b/v1"
            model_id = "b"
            api_key = "kept"
            [evaluator]
            base_url = "http://e/v1"
            model_id = "e"
            api_key = "replaced"
        "#,
        )
        .unwrap();
        config.apply_api_key("sk-env");
        assert_eq!(config.models["a"].api_key, "sk-env");
        assert_eq!(config.models["b"].api_key, "kept");
        assert_eq!(config.evaluator.unwrap().api_key, "sk-env");
    }

    #[test]
    fn load_from_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EvalConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.telemetry.history_capacity, 100);
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "output_dir = \"reports\"\n").unwrap();
        let config = EvalConfig::load_from(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("reports"));
    }

    #[test]
    fn load_with_explicit_path_reads_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "log_capacity = 42\n").unwrap();
        let config = EvalConfig::load_with(Some(&path)).unwrap();
        assert_eq!(config.log_capacity, 42);
    }

    #[test]
    fn load_from_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "output_dir = [").unwrap();
        assert!(EvalConfig::load_from(&path).is_err());
    }
}
