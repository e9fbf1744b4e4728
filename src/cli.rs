//! Interface de linha de comando do transeval baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, test, probe, demo)
//! e flags globais (--config, --output-dir, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::data::DataSelection;

/// transeval: avaliação em lote de traduções com telemetria de modelos.
#[derive(Debug, Parser)]
#[command(name = "transeval", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Arquivo de configuração (padrão: ./transeval.toml ou $TRANSEVAL_CONFIG).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Diretório dos relatórios; sobrepõe o valor do arquivo.
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa um job de avaliação sobre um dataset. Ctrl-C termina o job.
    Run(RunArgs),

    /// Traduz um único par com cada modelo e avalia a resposta.
    Test {
        /// Modelos a testar (chaves de [models] na configuração). Repetível.
        #[arg(long = "model", required = true)]
        models: Vec<String>,

        /// Dataset cujo primeiro par é usado; sem ele, usa um par embutido.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Verifica a saúde dos endpoints configurados.
    Probe {
        /// Endpoints extras no formato nome=url.
        #[arg(long = "endpoint", value_parser = parse_endpoint)]
        endpoints: Vec<(String, String)>,
    },

    /// Executa um job offline de demonstração, com pausa e retomada.
    Demo {
        /// Quantidade de pares gerados.
        #[arg(long, default_value_t = 6)]
        items: usize,
    },
}

/// Argumentos do subcomando `run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Dataset JSON no formato {"translation_pairs": [...]}.
    #[arg(long)]
    pub file: PathBuf,

    /// Modelos a avaliar (chaves de [models] na configuração). Repetível.
    #[arg(long = "model", required = true)]
    pub models: Vec<String>,

    /// Nome do job; padrão é o nome do arquivo.
    #[arg(long)]
    pub name: Option<String>,

    /// Usa apenas esta porcentagem inicial do dataset.
    #[arg(long, conflicts_with = "count")]
    pub percentage: Option<f64>,

    /// Usa apenas os primeiros N pares do dataset.
    #[arg(long)]
    pub count: Option<i64>,
}

impl RunArgs {
    /// Seleção de dados correspondente às flags.
    pub fn selection(&self) -> DataSelection {
        match (self.percentage, self.count) {
            (Some(p), _) => DataSelection::Percentage(p),
            (None, Some(n)) => DataSelection::Count(n),
            (None, None) => DataSelection::All,
        }
    }

    /// Nome efetivo do job.
    pub fn job_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "evaluation".to_string())
        })
    }
}

fn parse_endpoint(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, url)) if !name.is_empty() && !url.is_empty() => {
            Ok((name.to_string(), url.to_string()))
        }
        _ => Err(format!("expected name=url, got '{s}'")),
    }
}
