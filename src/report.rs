//! Aggregation of finished unit results into the persisted job report.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EvalError;
use crate::job::{Scores, UnitResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub summary: ReportSummary,
    pub model_performance: BTreeMap<String, ModelPerformance>,
    pub detailed_results: Vec<DetailedResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Distinct work items that produced at least one result.
    pub total_pairs: usize,
    pub models_tested: Vec<String>,
    pub evaluation_time: DateTime<Utc>,
}

/// Mean of each score dimension for one model, rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub avg_accuracy: f64,
    pub avg_fluency: f64,
    pub avg_terminology: f64,
    pub avg_overall: f64,
    pub total_translations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedResult {
    pub pair_id: String,
    pub source_text: String,
    pub target_text: String,
    pub model_name: String,
    pub translated_text: String,
    pub scores: Scores,
}

impl From<&UnitResult> for DetailedResult {
    fn from(r: &UnitResult) -> Self {
        Self {
            pair_id: r.pair_id.clone(),
            source_text: r.source_text.clone(),
            target_text: r.target_text.clone(),
            model_name: r.model_name.clone(),
            translated_text: r.translated_text.clone(),
            scores: r.scores.clone(),
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Average the results of one model. Missing scores count as zero.
/// Returns `None` for an empty set.
pub fn model_performance<'a>(
    results: impl IntoIterator<Item = &'a UnitResult>,
) -> Option<ModelPerformance> {
    let mut count = 0usize;
    let mut sums = [0.0f64; 4];
    for r in results {
        count += 1;
        sums[0] += r.scores.accuracy.unwrap_or(0.0);
        sums[1] += r.scores.fluency.unwrap_or(0.0);
        sums[2] += r.scores.terminology.unwrap_or(0.0);
        sums[3] += r.scores.overall.unwrap_or(0.0);
    }
    if count == 0 {
        return None;
    }
    let n = count as f64;
    Some(ModelPerformance {
        avg_accuracy: round2(sums[0] / n),
        avg_fluency: round2(sums[1] / n),
        avg_terminology: round2(sums[2] / n),
        avg_overall: round2(sums[3] / n),
        total_translations: count,
    })
}

/// Per-model statistics over every model that appears in `results`.
pub fn model_statistics(results: &[UnitResult]) -> BTreeMap<String, ModelPerformance> {
    let mut grouped: BTreeMap<&str, Vec<&UnitResult>> = BTreeMap::new();
    for r in results {
        grouped.entry(r.model_name.as_str()).or_default().push(r);
    }
    grouped
        .into_iter()
        .filter_map(|(model, rs)| model_performance(rs).map(|p| (model.to_string(), p)))
        .collect()
}

/// Fold the results of a finished job into a [`Report`].
///
/// Only the requested `models` are aggregated; a requested model without
/// results is left out of `model_performance`. Pure: the caller supplies the
/// evaluation timestamp.
pub fn build_report(
    results: &[UnitResult],
    models: &[String],
    evaluation_time: DateTime<Utc>,
) -> Report {
    let total_pairs = results
        .iter()
        .map(|r| r.pair_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let model_performance = models
        .iter()
        .filter_map(|model| {
            model_performance(results.iter().filter(|r| &r.model_name == model))
                .map(|p| (model.clone(), p))
        })
        .collect();

    Report {
        summary: ReportSummary {
            total_pairs,
            models_tested: models.to_vec(),
            evaluation_time,
        },
        model_performance,
        detailed_results: results.iter().map(DetailedResult::from).collect(),
    }
}

/// File name a job's report is stored under.
pub fn report_file_name(job_id: Uuid, at: DateTime<Utc>) -> String {
    format!(
        "evaluation_results_{job_id}_{}.json",
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Write the report as pretty JSON into `dir`, creating it if needed.
pub async fn write_report(dir: &Path, job_id: Uuid, report: &Report) -> Result<PathBuf, EvalError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(report_file_name(job_id, report.summary.evaluation_time));
    let json = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(&path, json).await?;
    Ok(path)
}
