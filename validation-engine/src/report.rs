// Run documents and the markdown compliance report
use crate::calibration::CalibrationReport;
use crate::orchestrator::{DeploymentDecision, EvaluationOutput, Verdict};
use crate::taxonomy::TaxonomyReport;
use config_engine::ThresholdSettings;
use deidentification_engine::masked_preview;
use error_common::Result;
use itertools::Itertools;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const EVALUATION_FILE: &str = "evaluation_results.json";
pub const SWEEP_FILE: &str = "threshold_sweep.json";
pub const OPTIMAL_FILE: &str = "optimal_thresholds.json";
pub const OVERLAY_FILE: &str = "thresholds.yaml";

/// Pretty-printed JSON, creating parent directories
///
/// # Errors
///
/// `Serialization` or `Io`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    info!(path = %path.display(), "Wrote run document");
    Ok(())
}

/// # Errors
///
/// `Serialization` or `Io`.
pub fn write_evaluation(dir: &Path, evaluation: &EvaluationOutput) -> Result<PathBuf> {
    let path = dir.join(EVALUATION_FILE);
    write_json(&path, evaluation)?;
    Ok(path)
}

/// Write the full sweep, the optimal-threshold summary and a settings
/// overlay built on `base`.
///
/// # Errors
///
/// `Serialization`, `Configuration` or `Io`.
pub fn write_calibration(
    dir: &Path,
    report: &CalibrationReport,
    base: &ThresholdSettings,
) -> Result<Vec<PathBuf>> {
    let sweep = dir.join(SWEEP_FILE);
    write_json(&sweep, report)?;

    let optimal = dir.join(OPTIMAL_FILE);
    write_json(&optimal, &report.optimal_document())?;

    let overlay = dir.join(OVERLAY_FILE);
    fs::write(&overlay, report.threshold_overlay_yaml(base)?)?;
    info!(path = %overlay.display(), "Wrote threshold overlay");

    Ok(vec![sweep, optimal, overlay])
}

fn pct(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Markdown report of an evaluation, its failure taxonomy and the verdict.
///
/// Example spans are shown as masked previews only.
pub fn compliance_report(
    evaluation: &EvaluationOutput,
    taxonomy: &TaxonomyReport,
    decision: &DeploymentDecision,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# PHI Redaction Validation Report\n");
    let _ = writeln!(out, "- Generated: {}", evaluation.generated_at.to_rfc3339());
    let _ = writeln!(out, "- Dataset SHA-256: `{}`", evaluation.dataset_sha256);
    let _ = writeln!(
        out,
        "- Items evaluated: {} of {} ({} excluded)\n",
        evaluation.evaluated_items,
        evaluation.item_count,
        evaluation.exclusions.len()
    );

    let badge = match decision.verdict {
        Verdict::Deploy => "**DEPLOY**",
        Verdict::ReturnForImprovement => "**RETURN FOR IMPROVEMENT**",
    };
    let _ = writeln!(out, "## Decision: {badge}\n\n{}\n", decision.reasoning);

    let _ = writeln!(out, "## Overall Metrics\n");
    let _ = writeln!(out, "| Metric | Value | {:.0}% CI |", evaluation.recall_ci.confidence_level * 100.0);
    let _ = writeln!(out, "|--------|-------|--------|");
    let (recall, precision) = (&evaluation.recall_ci, &evaluation.precision_ci);
    let _ = writeln!(
        out,
        "| Recall | {} | {} - {} |",
        pct(evaluation.overall.recall),
        pct(recall.lower),
        pct(recall.upper)
    );
    let _ = writeln!(
        out,
        "| Precision | {} | {} - {} |",
        pct(evaluation.overall.precision),
        pct(precision.lower),
        pct(precision.upper)
    );
    let _ = writeln!(out, "| F1 | {} | |", pct(evaluation.overall.f1));
    let _ = writeln!(out, "| F2 | {} | |\n", pct(evaluation.overall.f2));

    let _ = writeln!(out, "### Weighted Metrics\n");
    let _ = writeln!(out, "| Weighting | Recall | Precision | F2 |");
    let _ = writeln!(out, "|-----------|--------|-----------|----|");
    for (name, metrics) in [
        ("Frequency", &evaluation.frequency_weighted),
        ("Risk", &evaluation.risk_weighted),
    ] {
        let _ = writeln!(
            out,
            "| {name} | {} | {} | {} |",
            pct(metrics.recall),
            pct(metrics.precision),
            pct(metrics.f2)
        );
    }
    let comparison = &evaluation.weight_comparison;
    if !comparison.divergent.is_empty() {
        let listed = comparison
            .divergent
            .iter()
            .map(|(category, f, r)| format!("{category} (frequency {f}, risk {r})"))
            .join(", ");
        let _ = writeln!(out, "\nDivergent weights: {listed}");
    }
    if !comparison.zero_frequency.is_empty() {
        let _ = writeln!(
            out,
            "\nInvisible to frequency weighting: {}",
            comparison.zero_frequency.join(", ")
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Per-Category Results\n");
    let _ = writeln!(out, "| Category | TP | FN | FP | Precision | Recall | F2 |");
    let _ = writeln!(out, "|----------|----|----|----|-----------|--------|----|");
    for (category, counts) in &evaluation.counts {
        let metrics = counts.metrics();
        let _ = writeln!(
            out,
            "| {category} | {} | {} | {} | {} | {} | {} |",
            counts.true_positives,
            counts.false_negatives,
            counts.false_positives,
            pct(metrics.precision),
            pct(metrics.recall),
            pct(metrics.f2)
        );
    }

    if !evaluation.gate_failures.is_empty() {
        let _ = writeln!(out, "\n### Unmet Targets\n");
        for failure in &evaluation.gate_failures {
            let _ = writeln!(out, "- {failure}");
        }
    }

    let _ = writeln!(
        out,
        "\n## False Negatives ({})\n",
        taxonomy.total_false_negatives
    );
    for bucket in &taxonomy.buckets {
        let _ = writeln!(
            out,
            "### {} ({} cases, {:.1}%)\n\nRecommendation: {}\n",
            bucket.mode, bucket.count, bucket.percentage, bucket.recommendation
        );
        for case in &bucket.examples {
            let _ = writeln!(
                out,
                "- `{}` {} `{}`",
                case.item_id,
                case.category,
                masked_preview(&case.text)
            );
        }
        let _ = writeln!(out);
    }

    if !evaluation.exclusions.is_empty() {
        let _ = writeln!(out, "## Excluded Items\n");
        for exclusion in &evaluation.exclusions {
            let _ = writeln!(out, "- `{}` [{}] {}", exclusion.item_id, exclusion.code, exclusion.reason);
        }
    }
    out
}

/// # Errors
///
/// `Io`.
pub fn write_compliance_report(path: &Path, markdown: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, markdown)?;
    info!(path = %path.display(), "Wrote compliance report");
    Ok(())
}
