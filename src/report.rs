//! Tabular and markdown renderings of an [`EvaluationSummary`].

use crate::metrics::{AggregateSummary, EvaluationSummary, Metric};

fn cell(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_default()
}

/// One row per metric, one column per dataset plus `overall`.
pub fn render_csv(summary: &EvaluationSummary) -> String {
    let mut out = String::from("Metric");
    for dataset in summary.by_dataset.keys() {
        out.push(',');
        out.push_str(dataset);
    }
    out.push_str(",overall\n");

    for metric in Metric::ALL {
        out.push_str(metric.label());
        for agg in summary.by_dataset.values() {
            out.push(',');
            out.push_str(&cell(agg.means.get(metric)));
        }
        out.push(',');
        out.push_str(&cell(summary.overall.means.get(metric)));
        out.push('\n');
    }
    out
}

fn push_aggregate_rows(out: &mut String, name: &str, agg: &AggregateSummary) {
    out.push_str(&format!("| {name} | {} | {} |", agg.groups, agg.groups_failed));
    for metric in Metric::ALL {
        let excluded = agg.excluded.get(metric);
        match agg.means.get(metric) {
            Some(v) if excluded > 0 => out.push_str(&format!(" {v:.4} ({excluded} excl.) |")),
            Some(v) => out.push_str(&format!(" {v:.4} |")),
            None => out.push_str(&format!(" - ({excluded} excl.) |")),
        }
    }
    out.push('\n');
}

pub fn render_markdown(summary: &EvaluationSummary) -> String {
    let mut out = String::new();
    out.push_str("# Verifier Evaluation\n\n");
    out.push_str(&format!("- Method: {}\n", summary.method));
    if summary.normalize_scores {
        out.push_str("- Scores min-max normalized per group for MAE/R²\n");
    }
    out.push_str(&format!("- Records read: {}\n", summary.records_read));
    out.push_str(&format!("- Malformed dropped: {}\n", summary.malformed_dropped));
    if summary.groups_filtered_out > 0 {
        out.push_str(&format!(
            "- Groups filtered out by dataset: {}\n",
            summary.groups_filtered_out
        ));
    }
    out.push_str(&format!(
        "- Pooled MAE / R²: {} / {}\n",
        cell(summary.overall.pooled_mae),
        cell(summary.overall.pooled_r2)
    ));

    out.push_str("\n## Aggregate\n\n");
    out.push_str("| Scope | Groups | Failed |");
    for metric in Metric::ALL {
        out.push_str(&format!(" {} |", metric.label()));
    }
    out.push_str("\n|---|---|---|");
    for _ in Metric::ALL {
        out.push_str("---|");
    }
    out.push('\n');
    for (dataset, agg) in &summary.by_dataset {
        push_aggregate_rows(&mut out, dataset, agg);
    }
    push_aggregate_rows(&mut out, "overall", &summary.overall);

    let failed: Vec<_> = summary.groups.iter().filter(|g| g.error.is_some()).collect();
    if !failed.is_empty() {
        out.push_str("\n## Excluded Groups\n\n");
        for group in failed {
            out.push_str(&format!(
                "- {}/{}: {}\n",
                group.dataset,
                group.task_id,
                group.error.as_deref().unwrap_or_default()
            ));
        }
    }
    out
}
