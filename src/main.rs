use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

use transeval::backend::{
    ChatClient, EchoTranslator, ExactMatchEvaluator, HttpTranslator, LlmEvaluator, Throttled,
    check,
};
use transeval::cli::{Cli, Command, RunArgs};
use transeval::config::EvalConfig;
use transeval::data::{TranslationPair, load_dataset};
use transeval::job::{JobManager, JobStatus, JobStatusView};
use transeval::store::MemoryStore;
use transeval::telemetry::{LogBuffer, TelemetrySampler};
use transeval::ui::{self, JobProgress};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Installs the stderr formatter and the in-memory log buffer. The buffer sees
/// this crate's debug events so unit tallies do not depend on `--verbose`.
fn init_tracing(verbose: bool, logs: &Arc<LogBuffer>) {
    let default = if verbose { "transeval=debug" } else { "transeval=info" };
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(stderr_filter),
        )
        .with(
            logs.layer()
                .with_filter(Targets::new().with_target("transeval", Level::DEBUG)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = EvalConfig::load_with(cli.config.as_deref())?;
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    let logs = Arc::new(LogBuffer::new(config.log_capacity));
    init_tracing(cli.verbose, &logs);

    match cli.command {
        Command::Run(args) => run(config, args, logs).await,
        Command::Test { models, file } => test_models(config, models, file).await,
        Command::Probe { endpoints } => probe(config, endpoints).await,
        Command::Demo { items } => demo(config, items, logs).await,
    }
}

fn start_sampler(config: &EvalConfig) -> Result<TelemetrySampler> {
    let sampler = TelemetrySampler::new(config.telemetry.clone())?;
    for endpoint in &config.endpoints {
        sampler.register_endpoint(&endpoint.name, &endpoint.url);
    }
    Ok(sampler)
}

fn ensure_models(config: &EvalConfig, models: &[String]) -> Result<()> {
    for model in models {
        if !config.models.contains_key(model) {
            let known: Vec<_> = config.models.keys().map(String::as_str).collect();
            bail!("Unknown model '{model}'. Configured models: [{}]", known.join(", "));
        }
    }
    Ok(())
}

async fn run(config: EvalConfig, args: RunArgs, logs: Arc<LogBuffer>) -> Result<()> {
    ensure_models(&config, &args.models)?;
    let judge = config
        .evaluator
        .clone()
        .context("No [evaluator] section in the configuration")?;

    let pairs = load_dataset(&args.file)
        .await
        .with_context(|| format!("Failed to load dataset {}", args.file.display()))?;
    let pairs = args.selection().apply(pairs);
    tracing::info!(pairs = pairs.len(), models = ?args.models, "Dataset loaded");

    let client = ChatClient::new()?;
    let sampler = start_sampler(&config)?;
    sampler.start().await;

    let manager = JobManager::new(
        Arc::new(MemoryStore::new()),
        Arc::new(HttpTranslator::new(client.clone(), config.models.clone())),
        Arc::new(LlmEvaluator::new(client, judge)),
        sampler.throughput(),
        config.output_dir.clone(),
    )
    .with_logs(logs);

    let name = args.job_name();
    let id = manager
        .create_job(
            name.as_str(),
            pairs,
            args.models.clone(),
            Some(args.file.display().to_string()),
        )
        .await?;

    let view = follow(&manager, id, &name).await?;
    ui::print_model_statistics(&view);
    ui::print_unit_counters(&view);
    ui::print_problems(&manager.job_logs(id, 20));
    println!();
    ui::print_comparison(&sampler.comparison());

    sampler.stop().await;
    manager.wait_idle().await;
    if view.record.status == JobStatus::Failed {
        bail!(
            "Job {id} failed: {}",
            view.record.error_message.unwrap_or_default()
        );
    }
    Ok(())
}

/// Poll a job until it is terminal. The first Ctrl-C terminates it.
async fn follow(manager: &JobManager, id: Uuid, name: &str) -> Result<JobStatusView> {
    let mut progress = JobProgress::start(name);
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut terminate_sent = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                progress.note("Interrupt received, terminating job");
            }
            _ = ticker.tick() => {
                let view = manager.get_status(id).await?;
                progress.update(&view);
                if view.record.status.is_terminal() {
                    progress.finish(&view);
                    return Ok(view);
                }
                // A pending job rejects terminate; keep trying until it runs.
                if interrupted && !terminate_sent && view.record.status.is_active() {
                    match manager.terminate(id).await {
                        Ok(()) => terminate_sent = true,
                        Err(e) => tracing::debug!(job_id = %id, error = %e, "Terminate not accepted yet"),
                    }
                }
            }
        }
    }
}

/// Translate one pair with each model and print a quick verdict.
async fn test_models(
    config: EvalConfig,
    models: Vec<String>,
    file: Option<std::path::PathBuf>,
) -> Result<()> {
    ensure_models(&config, &models)?;
    let pair = match file {
        Some(path) => load_dataset(&path)
            .await
            .with_context(|| format!("Failed to load dataset {}", path.display()))?
            .into_iter()
            .next()
            .with_context(|| format!("Dataset {} has no pairs", path.display()))?,
        None => check::sample_pair(),
    };

    let translator = HttpTranslator::new(ChatClient::new()?, config.models.clone());
    let checks = check::check_models(&translator, &models, &pair).await;
    println!("  source: {}", pair.source_text);
    ui::print_model_checks(&checks);
    if checks.iter().all(|c| !c.success) {
        bail!("No model produced a translation");
    }
    Ok(())
}

async fn probe(config: EvalConfig, extra: Vec<(String, String)>) -> Result<()> {
    let sampler = start_sampler(&config)?;
    for (name, url) in extra {
        sampler.register_endpoint(name, url);
    }
    let snapshot = sampler.snapshot().await;
    ui::print_snapshot(&snapshot);
    Ok(())
}

fn demo_pairs(n: usize) -> Vec<TranslationPair> {
    const SAMPLES: [(&str, &str); 4] = [
        ("Check the engine oil level.", "检查发动机滑油油位。"),
        ("Close the cargo door.", "关闭货舱门。"),
        ("Replace the hydraulic filter.", "更换液压油滤。"),
        ("Inspect the landing gear.", "检查起落架。"),
    ];
    (0..n)
        .map(|i| {
            let (source, target) = SAMPLES[i % SAMPLES.len()];
            TranslationPair::new(format!("demo-{i}"), source, target)
        })
        .collect()
}

async fn wait_until(
    manager: &JobManager,
    id: Uuid,
    done: impl Fn(&JobStatusView) -> bool,
) -> Result<JobStatusView> {
    loop {
        let view = manager.get_status(id).await?;
        if done(&view) || view.record.status.is_terminal() {
            return Ok(view);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Offline job that shows pause and resume without any model endpoint.
async fn demo(config: EvalConfig, items: usize, logs: Arc<LogBuffer>) -> Result<()> {
    let sampler = start_sampler(&config)?;
    sampler.start().await;

    let manager = JobManager::new(
        Arc::new(MemoryStore::new()),
        Arc::new(Throttled::new(EchoTranslator, Duration::from_millis(150))),
        Arc::new(ExactMatchEvaluator),
        sampler.throughput(),
        config.output_dir.clone(),
    )
    .with_logs(logs);
    let models = vec!["echo-a".to_string(), "echo-b".to_string()];
    let id = manager
        .create_job("demo", demo_pairs(items.max(1)), models, None)
        .await?;

    let view = wait_until(&manager, id, |v| v.results_count >= 2).await?;
    if view.record.status == JobStatus::Running {
        match manager.pause(id).await {
            Ok(()) => {
                let view = wait_until(&manager, id, |v| v.record.status == JobStatus::Paused).await?;
                println!(
                    "  paused at {}% with {} results",
                    view.record.progress, view.results_count
                );
                tokio::time::sleep(Duration::from_secs(1)).await;
                if let Err(e) = manager.resume(id).await {
                    tracing::warn!(error = %e, "Resume rejected");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Pause rejected"),
        }
    }

    let view = follow(&manager, id, "demo").await?;
    ui::print_model_statistics(&view);
    ui::print_unit_counters(&view);
    println!();
    ui::print_comparison(&sampler.comparison());
    println!();
    ui::print_snapshot(&sampler.snapshot().await);

    sampler.stop().await;
    manager.wait_idle().await;
    Ok(())
}
