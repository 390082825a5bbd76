//! Metric engine: how well a scoring method's values track ground truth,
//! per task group and in aggregate.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::HarnessError;
use crate::record::{group_by_task, read_jsonl, CandidateRecord, TaskGroups, TaskKey};
use crate::scoring::ScoringMethod;
use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Top1,
    Bottom1,
    Spearman,
    Kendall,
    Mae,
    R2,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Top1,
        Metric::Bottom1,
        Metric::Spearman,
        Metric::Kendall,
        Metric::Mae,
        Metric::R2,
    ];

    fn index(self) -> usize {
        match self {
            Metric::Top1 => 0,
            Metric::Bottom1 => 1,
            Metric::Spearman => 2,
            Metric::Kendall => 3,
            Metric::Mae => 4,
            Metric::R2 => 5,
        }
    }

    /// Row label used in tabular reports.
    pub fn label(self) -> &'static str {
        match self {
            Metric::Top1 => "top1_accuracy",
            Metric::Bottom1 => "bottom1_accuracy",
            Metric::Spearman => "mean_spearman",
            Metric::Kendall => "mean_kendall_tau",
            Metric::Mae => "mean_mae",
            Metric::R2 => "mean_r2",
        }
    }
}

/// The six metric values; `None` where undefined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricValues {
    pub top1: Option<f64>,
    pub bottom1: Option<f64>,
    pub spearman: Option<f64>,
    pub kendall: Option<f64>,
    pub mae: Option<f64>,
    pub r2: Option<f64>,
}

impl MetricValues {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Top1 => self.top1,
            Metric::Bottom1 => self.bottom1,
            Metric::Spearman => self.spearman,
            Metric::Kendall => self.kendall,
            Metric::Mae => self.mae,
            Metric::R2 => self.r2,
        }
    }

    fn set(&mut self, metric: Metric, value: Option<f64>) {
        let slot = match metric {
            Metric::Top1 => &mut self.top1,
            Metric::Bottom1 => &mut self.bottom1,
            Metric::Spearman => &mut self.spearman,
            Metric::Kendall => &mut self.kendall,
            Metric::Mae => &mut self.mae,
            Metric::R2 => &mut self.r2,
        };
        *slot = value;
    }
}

/// Per-metric group counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricCounts {
    pub top1: usize,
    pub bottom1: usize,
    pub spearman: usize,
    pub kendall: usize,
    pub mae: usize,
    pub r2: usize,
}

impl MetricCounts {
    pub fn get(&self, metric: Metric) -> usize {
        match metric {
            Metric::Top1 => self.top1,
            Metric::Bottom1 => self.bottom1,
            Metric::Spearman => self.spearman,
            Metric::Kendall => self.kendall,
            Metric::Mae => self.mae,
            Metric::R2 => self.r2,
        }
    }

    fn bump(&mut self, metric: Metric) {
        match metric {
            Metric::Top1 => self.top1 += 1,
            Metric::Bottom1 => self.bottom1 += 1,
            Metric::Spearman => self.spearman += 1,
            Metric::Kendall => self.kendall += 1,
            Metric::Mae => self.mae += 1,
            Metric::R2 => self.r2 += 1,
        }
    }
}

/// Metric summary for one task group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub dataset: String,
    pub task_id: String,
    pub n: usize,
    pub metrics: MetricValues,
    /// Set when the group could not be evaluated at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Unweighted means over the groups where each metric is defined.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateSummary {
    pub groups: usize,
    /// Groups excluded from every metric by a missing field.
    pub groups_failed: usize,
    pub records: usize,
    pub means: MetricValues,
    pub defined: MetricCounts,
    pub excluded: MetricCounts,
    /// MAE over every evaluated record, ignoring group boundaries.
    pub pooled_mae: Option<f64>,
    /// R² over every evaluated record, ignoring group boundaries.
    pub pooled_r2: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub method: ScoringMethod,
    /// Min-max rescale scores within each group before MAE and R².
    pub normalize_scores: bool,
    /// Only evaluate these datasets; `None` keeps all.
    pub datasets: Option<Vec<String>>,
}

impl EvalOptions {
    pub fn new(method: ScoringMethod) -> Self {
        Self {
            method,
            normalize_scores: false,
            datasets: None,
        }
    }

    fn includes(&self, dataset: &str) -> bool {
        self.datasets
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|d| d == dataset))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub method: ScoringMethod,
    pub field: &'static str,
    pub normalize_scores: bool,
    pub records_read: usize,
    /// Unparsable lines and records without a (dataset, task_id) pair.
    pub malformed_dropped: usize,
    pub groups_filtered_out: usize,
    pub groups: Vec<GroupSummary>,
    pub overall: AggregateSummary,
    pub by_dataset: BTreeMap<String, AggregateSummary>,
}

/// Scores (x) and ground truth (y) for one group, in record order.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupScores {
    pub scores: Vec<f64>,
    pub truth: Vec<f64>,
}

/// Pull method values and ground scores from a group, failing with
/// `MissingField` on the first record that lacks either.
pub fn extract_scores(
    key: &TaskKey,
    records: &[CandidateRecord],
    method: ScoringMethod,
) -> Result<GroupScores, HarnessError> {
    let missing = |field: &str| HarnessError::MissingField {
        field: field.to_string(),
        dataset: key.dataset.clone(),
        task_id: key.task_id.clone(),
    };

    let mut scores = Vec::with_capacity(records.len());
    let mut truth = Vec::with_capacity(records.len());
    for record in records {
        scores.push(method.value(record).ok_or_else(|| missing(method.field_name()))?);
        truth.push(
            record
                .ground_score()
                .ok_or_else(|| missing(crate::record::GROUND_SCORE_KEY))?,
        );
    }
    Ok(GroupScores { scores, truth })
}

/// All six metrics for one group's scores.
pub fn compute_metrics(group: &GroupScores, normalize_scores: bool) -> MetricValues {
    let x = &group.scores;
    let y = &group.truth;
    let scaled;
    let x_abs: &[f64] = if normalize_scores {
        scaled = stats::min_max_normalize(x);
        scaled.as_slice()
    } else {
        x.as_slice()
    };

    let as_unit = |hit: bool| if hit { 1.0 } else { 0.0 };
    MetricValues {
        top1: stats::top1_hit(x, y).map(as_unit),
        bottom1: stats::bottom1_hit(x, y).map(as_unit),
        spearman: stats::spearman_rho(x, y),
        kendall: stats::kendall_tau_b(x, y),
        mae: stats::mean_absolute_error(x_abs, y),
        r2: stats::r_squared(x_abs, y),
    }
}

#[derive(Default)]
struct Accumulator {
    summary: AggregateSummary,
    sums: [f64; 6],
    pooled_x: Vec<f64>,
    pooled_y: Vec<f64>,
}

impl Accumulator {
    fn add_failed(&mut self, n: usize) {
        self.summary.groups += 1;
        self.summary.groups_failed += 1;
        self.summary.records += n;
        for metric in Metric::ALL {
            self.summary.excluded.bump(metric);
        }
    }

    fn add(&mut self, values: &MetricValues, pooled_x: &[f64], pooled_y: &[f64]) {
        self.summary.groups += 1;
        self.summary.records += pooled_y.len();
        for metric in Metric::ALL {
            match values.get(metric) {
                Some(v) => {
                    self.sums[metric.index()] += v;
                    self.summary.defined.bump(metric);
                }
                None => self.summary.excluded.bump(metric),
            }
        }
        self.pooled_x.extend_from_slice(pooled_x);
        self.pooled_y.extend_from_slice(pooled_y);
    }

    fn finish(mut self) -> AggregateSummary {
        for metric in Metric::ALL {
            let count = self.summary.defined.get(metric);
            let mean = (count > 0).then(|| self.sums[metric.index()] / count as f64);
            self.summary.means.set(metric, mean);
        }
        self.summary.pooled_mae = stats::mean_absolute_error(&self.pooled_x, &self.pooled_y);
        self.summary.pooled_r2 = stats::r_squared(&self.pooled_x, &self.pooled_y);
        self.summary
    }
}

fn log_degenerate(key: &TaskKey, values: &MetricValues, n: usize) {
    if values.spearman.is_none() {
        let reason = if n < 2 {
            "fewer than two records"
        } else {
            "constant scores or ground truth"
        };
        let e = HarnessError::DegenerateGroup {
            dataset: key.dataset.clone(),
            task_id: key.task_id.clone(),
            reason,
        };
        debug!(error = %e, "Correlation metrics undefined");
    }
}

/// Evaluate grouped records.
pub fn evaluate_groups(groups: &TaskGroups, opts: &EvalOptions) -> EvaluationSummary {
    let mut overall = Accumulator::default();
    let mut per_dataset: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut summaries = Vec::with_capacity(groups.len());
    let mut filtered_out = 0usize;
    let mut records_read = 0usize;

    for (key, records) in groups {
        records_read += records.len();
        if !opts.includes(&key.dataset) {
            filtered_out += 1;
            continue;
        }
        let dataset_acc = per_dataset.entry(key.dataset.clone()).or_default();

        match extract_scores(key, records, opts.method) {
            Ok(group) => {
                let values = compute_metrics(&group, opts.normalize_scores);
                log_degenerate(key, &values, records.len());
                let pooled_x = if opts.normalize_scores {
                    stats::min_max_normalize(&group.scores)
                } else {
                    group.scores.clone()
                };
                overall.add(&values, &pooled_x, &group.truth);
                dataset_acc.add(&values, &pooled_x, &group.truth);
                summaries.push(GroupSummary {
                    dataset: key.dataset.clone(),
                    task_id: key.task_id.clone(),
                    n: records.len(),
                    metrics: values,
                    error: None,
                });
            }
            Err(e) => {
                warn!(task = %key, code = e.code(), error = %e, "Excluding task group");
                overall.add_failed(records.len());
                dataset_acc.add_failed(records.len());
                summaries.push(GroupSummary {
                    dataset: key.dataset.clone(),
                    task_id: key.task_id.clone(),
                    n: records.len(),
                    metrics: MetricValues::default(),
                    error: Some(e.to_string()),
                });
            }
        }
    }

    EvaluationSummary {
        method: opts.method,
        field: opts.method.field_name(),
        normalize_scores: opts.normalize_scores,
        records_read,
        malformed_dropped: 0,
        groups_filtered_out: filtered_out,
        groups: summaries,
        overall: overall.finish(),
        by_dataset: per_dataset
            .into_iter()
            .map(|(dataset, acc)| (dataset, acc.finish()))
            .collect(),
    }
}

/// Group and evaluate raw records. Keyless records are counted as malformed.
pub fn evaluate_records(records: Vec<CandidateRecord>, opts: &EvalOptions) -> EvaluationSummary {
    let (groups, keyless) = group_by_task(records);
    if keyless > 0 {
        warn!(dropped = keyless, "Dropped records without (dataset, task_id)");
    }
    let mut summary = evaluate_groups(&groups, opts);
    summary.records_read += keyless;
    summary.malformed_dropped += keyless;
    summary
}

/// Evaluate a merged or sampled dataset file.
pub fn evaluate_file(
    path: impl AsRef<Path>,
    opts: &EvalOptions,
) -> Result<EvaluationSummary, HarnessError> {
    let batch = read_jsonl(path)?;
    let mut summary = evaluate_records(batch.records, opts);
    summary.records_read += batch.malformed;
    summary.malformed_dropped += batch.malformed;

    info!(
        method = %opts.method,
        groups = summary.overall.groups,
        failed = summary.overall.groups_failed,
        "Evaluated dataset"
    );
    Ok(summary)
}
