//! Output formatting for CLI commands.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, XiphosArgs};
use crate::error::Result;
use crate::ml::Evaluation;
use crate::pipeline::{PersistenceReport, PipelineMetrics};
use crate::service::SearchResponse;

/// Result of the `train` command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSummary {
    pub output_dir: String,
    pub metrics: PipelineMetrics,
    pub persistence: PersistenceReport,
}

/// Per-model aggregate of the folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoldSummary {
    pub folds: usize,
    pub mean_accuracy: f64,
    pub min_accuracy: f64,
    pub max_accuracy: f64,
    pub mean_f1: f64,
}

impl FoldSummary {
    pub fn from_evaluations(evaluations: &[Evaluation]) -> Self {
        if evaluations.is_empty() {
            return FoldSummary {
                folds: 0,
                mean_accuracy: 0.0,
                min_accuracy: 0.0,
                max_accuracy: 0.0,
                mean_f1: 0.0,
            };
        }
        let n = evaluations.len() as f64;
        let accuracies = evaluations.iter().map(|e| e.accuracy);
        FoldSummary {
            folds: evaluations.len(),
            mean_accuracy: accuracies.clone().sum::<f64>() / n,
            min_accuracy: accuracies.clone().fold(f64::INFINITY, f64::min),
            max_accuracy: accuracies.fold(f64::NEG_INFINITY, f64::max),
            mean_f1: evaluations.iter().map(|e| e.f1_score).sum::<f64>() / n,
        }
    }
}

/// Result of the `cross-validate` command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossValidationSummary {
    pub requested_folds: usize,
    pub models: BTreeMap<String, FoldSummary>,
}

/// Result of the `search` command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSummary {
    pub query: String,
    pub bundle_version: Option<u64>,
    pub response: SearchResponse,
}

/// Plain-text rendering used by the `human` format.
pub trait HumanOutput {
    fn render_human(&self) -> String;
}

/// Output a result in the requested format.
pub fn output_result<T: Serialize + HumanOutput>(
    message: &str,
    result: &T,
    args: &XiphosArgs,
) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_human<T: HumanOutput>(message: &str, result: &T, args: &XiphosArgs) -> Result<()> {
    if args.verbosity() > 1 {
        println!("{message}");
        println!();
    }
    print!("{}", result.render_human());
    Ok(())
}

fn output_json<T: Serialize>(result: &T, args: &XiphosArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}

impl HumanOutput for TrainingSummary {
    fn render_human(&self) -> String {
        let mut out = String::new();
        let m = &self.metrics;
        let _ = writeln!(out, "Training Results:");
        let _ = writeln!(out, "═════════════════");
        for result in &m.results {
            let _ = write!(
                out,
                "{:<22} {:<8} {:>6}ms  accuracy {:.3}",
                result.model_id,
                result.status.as_str(),
                result.training_time_ms,
                result.evaluation.accuracy
            );
            if let Some(error) = &result.error {
                let _ = write!(out, "  ({error})");
            }
            out.push('\n');
        }
        out.push('\n');
        let _ = writeln!(out, "Models attempted: {}", m.models_trained);
        let _ = writeln!(out, "Success rate: {:.1}%", m.success_rate * 100.0);
        let _ = writeln!(out, "Average accuracy: {:.3}", m.average_accuracy);
        if let Some(best) = &m.best_model {
            let _ = writeln!(out, "Best model: {best}");
        }
        let _ = writeln!(out, "Wall time: {}ms", m.total_training_time_ms);
        let _ = writeln!(
            out,
            "Saved {} model(s) to {} ({})",
            self.persistence.succeeded.len(),
            self.output_dir,
            format_bytes(self.persistence.bytes)
        );
        for (id, error) in &self.persistence.failed {
            let _ = writeln!(out, "  failed to save {id}: {error}");
        }
        out
    }
}

impl HumanOutput for CrossValidationSummary {
    fn render_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Cross-Validation ({} folds requested):", self.requested_folds);
        let _ = writeln!(out, "══════════════════════════════════════");
        for (id, summary) in &self.models {
            if summary.folds == 0 {
                let _ = writeln!(out, "{id:<22} no samples");
                continue;
            }
            let _ = writeln!(
                out,
                "{id:<22} {} fold(s)  accuracy {:.3} [{:.3}, {:.3}]  f1 {:.3}",
                summary.folds,
                summary.mean_accuracy,
                summary.min_accuracy,
                summary.max_accuracy,
                summary.mean_f1
            );
        }
        out
    }
}

impl HumanOutput for SearchSummary {
    fn render_human(&self) -> String {
        let mut out = String::new();
        let response = &self.response;
        let _ = writeln!(out, "Search Results for \"{}\":", self.query);
        let _ = writeln!(out, "═══════════════");
        for (i, result) in response.results.iter().enumerate() {
            let rank = response.pagination.offset + i + 1;
            let _ = writeln!(out, "{rank}. {} (Score: {:.3})", result.title, result.score);
            if let Some(category) = &result.category {
                let _ = writeln!(out, "   category: {category}");
            }
        }
        if response.results.is_empty() {
            let _ = writeln!(out, "No results.");
        }
        out.push('\n');
        let _ = writeln!(
            out,
            "Showing {} of {} (offset {}, limit {})",
            response.results.len(),
            response.total_count,
            response.pagination.offset,
            response.pagination.limit
        );
        let _ = writeln!(out, "Search time: {:.2}ms", response.processing_time_ms);

        if !response.suggestions.is_empty() {
            out.push('\n');
            let _ = writeln!(out, "Suggestions:");
            for suggestion in &response.suggestions {
                let _ = writeln!(out, "  {} ({:.2})", suggestion.text, suggestion.confidence);
            }
        }

        let analysis = &response.semantic_analysis;
        if let Some(enhancement) = &analysis.enhancement
            && enhancement.expanded_query != self.query
        {
            let _ = writeln!(out, "Expanded query: {}", enhancement.expanded_query);
        }
        if let Some(category) = &analysis.category {
            let _ = writeln!(out, "Category: {category}");
        }
        if response.personalization_applied {
            let _ = writeln!(out, "Personalized ranking applied");
        }
        for anomaly in &response.anomalies_detected {
            let _ = writeln!(out, "Anomaly: {}", anomaly.message);
        }
        for insight in &response.optimization_insights {
            let _ = writeln!(out, "Insight: {}", insight.message);
        }
        out
    }
}

/// Format bytes in human-readable format.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{size:.1} {}", UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pipeline::{ResourceUsage, TrainingResult};
    use crate::service::{PageInfo, SearchResult};

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GB");
    }

    #[test]
    fn test_fold_summary() {
        let evaluations = [0.5, 0.7, 0.9].map(|accuracy| Evaluation {
            accuracy,
            f1_score: 0.4,
            ..Default::default()
        });
        let summary = FoldSummary::from_evaluations(&evaluations);
        assert_eq!(summary.folds, 3);
        assert!((summary.mean_accuracy - 0.7).abs() < 1e-9);
        assert_eq!(summary.min_accuracy, 0.5);
        assert_eq!(summary.max_accuracy, 0.9);
        assert!((summary.mean_f1 - 0.4).abs() < 1e-9);

        assert_eq!(FoldSummary::from_evaluations(&[]).folds, 0);
    }

    #[test]
    fn test_training_summary_lists_failures() {
        let metrics = PipelineMetrics::from_results(
            vec![
                TrainingResult::success(
                    "query_suggestion",
                    Evaluation::default(),
                    3,
                    Duration::from_millis(2),
                ),
                TrainingResult::failed("bogus", "unknown model", Duration::ZERO),
            ],
            Duration::from_millis(4),
            ResourceUsage::default(),
        );
        let summary = TrainingSummary {
            output_dir: "models".to_string(),
            metrics,
            persistence: PersistenceReport {
                succeeded: vec!["query_suggestion".to_string()],
                failed: vec![],
                bytes: 2048,
            },
        };

        let text = summary.render_human();
        assert!(text.contains("query_suggestion"));
        assert!(text.contains("unknown model"));
        assert!(text.contains("Success rate: 50.0%"));
        assert!(text.contains("2.0 KB"));
    }

    #[test]
    fn test_search_summary_ranks_from_offset() {
        let summary = SearchSummary {
            query: "db2".to_string(),
            bundle_version: Some(1),
            response: SearchResponse {
                results: vec![SearchResult::new("kb-2", "DB2 SQLCODE -911", 0.6)],
                total_count: 3,
                pagination: PageInfo {
                    offset: 2,
                    limit: 1,
                    total_items: 3,
                },
                ..Default::default()
            },
        };

        let text = summary.render_human();
        assert!(text.contains("3. DB2 SQLCODE -911"));
        assert!(text.contains("Showing 1 of 3"));
    }
}
