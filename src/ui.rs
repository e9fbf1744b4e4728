//! Interface de terminal do transeval: barra de progresso e saída colorida.
//!
//! Usa `indicatif` para a barra de progresso de um job e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente a execução
//! de um job; as funções `print_*` exibem telemetria e estatísticas.

use console::Style;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};

use crate::backend::{ModelCheck, Quality};
use crate::job::{JobStatus, JobStatusView};
use crate::telemetry::{EndpointStatus, LogEntry, SpeedComparison, SpeedEntry, TelemetrySnapshot};

/// Indicador visual de progresso para a execução de um job no terminal.
///
/// A barra vai de 0 a 100 e acompanha o campo `progress` do job. Mensagens
/// finais são verdes (concluído), vermelhas (falha) ou amarelas (terminado).
pub struct JobProgress {
    // Barra de progresso do indicatif.
    pb: ProgressBar,
    // Último status exibido, para registrar transições uma única vez.
    last_status: Option<JobStatus>,
    green: Style,
    red: Style,
    yellow: Style,
}

impl JobProgress {
    /// Inicia a barra com o nome do job.
    pub fn start(name: &str) -> Self {
        let pb = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.set_message(format!("{name}: pending"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            last_status: None,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza a barra a partir do status atual do job.
    pub fn update(&mut self, view: &JobStatusView) {
        let record = &view.record;
        self.pb.set_position(u64::from(record.progress));
        self.pb.set_message(format!(
            "{}: {} ({} results)",
            record.name, record.status, view.results_count
        ));

        if self.last_status != Some(record.status) {
            if matches!(record.status, JobStatus::Paused) {
                self.pb
                    .println(format!("  {} Job paused", self.yellow.apply_to("‖")));
            } else if self.last_status == Some(JobStatus::Paused) {
                self.pb
                    .println(format!("  {} Job resumed", self.yellow.apply_to("▶")));
            }
            self.last_status = Some(record.status);
        }
    }

    /// Imprime uma linha acima da barra sem apagá-la.
    pub fn note(&self, message: &str) {
        self.pb.println(format!("  {message}"));
    }

    /// Finaliza a barra e exibe o resultado final do job.
    pub fn finish(&self, view: &JobStatusView) {
        self.pb.finish_and_clear();
        let record = &view.record;
        match record.status {
            JobStatus::Completed => {
                println!(
                    "  {} Job completed: {} results",
                    self.green.apply_to("✓"),
                    view.results_count
                );
                if let Some(path) = &record.output_artifact {
                    println!("    report: {path}");
                }
            }
            JobStatus::Failed => {
                println!(
                    "  {} Job failed: {}",
                    self.red.apply_to("✗"),
                    record.error_message.as_deref().unwrap_or("unknown error")
                );
            }
            JobStatus::Terminated => {
                println!(
                    "  {} {} after {} results",
                    self.yellow.apply_to("■"),
                    record.error_message.as_deref().unwrap_or("Terminated"),
                    view.results_count
                );
            }
            other => println!("  Job is {other}"),
        }
    }
}

/// Imprime as médias por modelo de um job concluído.
pub fn print_model_statistics(view: &JobStatusView) {
    let Some(stats) = &view.model_statistics else {
        return;
    };
    let bold = Style::new().bold();
    println!();
    println!(
        "{}",
        bold.apply_to(format!(
            "{:<24} {:>8} {:>8} {:>8} {:>8} {:>6}",
            "model", "accuracy", "fluency", "terms", "overall", "n"
        ))
    );
    for (model, perf) in stats {
        println!(
            "{:<24} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>6}",
            model,
            perf.avg_accuracy,
            perf.avg_fluency,
            perf.avg_terminology,
            perf.avg_overall,
            perf.total_translations
        );
    }
}

/// Imprime, por modelo, as unidades iniciadas, concluídas e com erro.
pub fn print_unit_counters(view: &JobStatusView) {
    if view.unit_counters.is_empty() {
        return;
    }
    let red = Style::new().red();
    println!();
    for (model, c) in &view.unit_counters {
        let errors = format!("{} errors", c.errors);
        let errors = if c.errors > 0 {
            red.apply_to(errors)
        } else {
            Style::new().apply_to(errors)
        };
        println!("  {model:<24} {}/{} units  {errors}", c.completed, c.total);
    }
}

/// Imprime os avisos e erros mais recentes de um job.
pub fn print_problems(entries: &[LogEntry]) {
    let yellow = Style::new().yellow();
    for entry in entries.iter().filter(|e| e.is_problem()) {
        let model = entry.model.as_deref().unwrap_or("-");
        let error = entry.fields.get("error").map(String::as_str).unwrap_or("");
        println!(
            "  {} {model}: {} {error}",
            yellow.apply_to(&entry.level),
            entry.message
        );
    }
}

/// Imprime o resultado do teste rápido de cada modelo.
pub fn print_model_checks(checks: &[ModelCheck]) {
    let green = Style::new().green();
    let red = Style::new().red();
    let yellow = Style::new().yellow();
    for check in checks {
        let verdict = match check.quality {
            Quality::Ok => green.apply_to(check.quality.to_string()),
            Quality::Error => red.apply_to(check.quality.to_string()),
            _ => yellow.apply_to(check.quality.to_string()),
        };
        println!(
            "  {:<24} {verdict:<16} {:>6.2}s",
            check.model, check.processing_time
        );
        match &check.error_message {
            Some(message) => println!("    {message}"),
            None => println!("    {}", check.translated_text),
        }
    }
}

/// Imprime o estado de cada endpoint verificado.
pub fn print_endpoint_status(
    endpoints: &IndexMap<String, String>,
    status: &IndexMap<String, EndpointStatus>,
) {
    let green = Style::new().green();
    let red = Style::new().red();
    if status.is_empty() {
        println!("  no endpoints registered");
        return;
    }
    for (name, st) in status {
        let url = endpoints.get(name).map(String::as_str).unwrap_or("-");
        let mark = if st.online {
            green.apply_to("online")
        } else {
            red.apply_to("offline")
        };
        let model = if st.model_loaded { "model loaded" } else { "no model" };
        println!("  {name:<16} {mark:<8} {model:<13} {url}");
    }
}

fn print_speed(entry: &SpeedEntry) {
    println!(
        "  {:<28} avg {:>8.2} tok/s  last {:>8.2} tok/s  ({} requests, {} tokens)",
        entry.name, entry.avg_speed, entry.last_speed, entry.total_requests, entry.total_tokens
    );
}

/// Imprime a comparação de velocidade entre modelos locais e remotos.
pub fn print_comparison(cmp: &SpeedComparison) {
    let bold = Style::new().bold();
    println!("{}", bold.apply_to("Throughput"));
    print_speed(&cmp.local_model);
    for entry in cmp.local_models.iter().chain(&cmp.api_models) {
        print_speed(entry);
    }
}

/// Imprime um snapshot de telemetria resumido.
pub fn print_snapshot(snapshot: &TelemetrySnapshot) {
    let bold = Style::new().bold();
    println!("{}", bold.apply_to(format!("Telemetry @ {}", snapshot.timestamp)));
    match &snapshot.system {
        Some(sys) => println!(
            "  cpu {:.1}%  mem {:.1}% ({:.1}/{:.1} GB)  disk {:.1}% ({:.1}/{:.1} GB)",
            sys.cpu_percent,
            sys.memory_percent,
            sys.memory_used_gb,
            sys.memory_total_gb,
            sys.disk_percent,
            sys.disk_used_gb,
            sys.disk_total_gb
        ),
        None => println!("  system stats unavailable"),
    }
    println!("  history: {} samples", snapshot.history.timestamps.len());
    print_endpoint_status(&snapshot.endpoints, &snapshot.status);
}
