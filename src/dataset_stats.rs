//! Quick per-dataset overview of a candidate file.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::record::CandidateRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetStats {
    pub records: usize,
    pub task_groups: usize,
    /// Records with a usable ground score.
    pub scored: usize,
    pub mean_ground_score: Option<f64>,
    /// Share of scored records passing every hidden test.
    pub fully_passing: Option<f64>,
}

/// Per-dataset counts. Records without a dataset are listed under `""`.
pub fn dataset_stats(records: &[CandidateRecord]) -> BTreeMap<String, DatasetStats> {
    let mut tasks: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut out: BTreeMap<String, DatasetStats> = BTreeMap::new();

    for record in records {
        let dataset = record.dataset().unwrap_or_default().to_string();
        let entry = out.entry(dataset.clone()).or_default();
        entry.records += 1;
        if let Some(task) = record.task_id() {
            tasks.entry(dataset.clone()).or_default().insert(task);
        }
        if let Some(score) = record.ground_score() {
            entry.scored += 1;
            let (sum, passing) = sums.entry(dataset).or_insert((0.0, 0));
            *sum += score;
            if score >= 1.0 {
                *passing += 1;
            }
        }
    }

    for (dataset, stats) in out.iter_mut() {
        stats.task_groups = tasks.get(dataset).map_or(0, BTreeSet::len);
        if let Some(&(sum, passing)) = sums.get(dataset) {
            let scored = stats.scored as f64;
            stats.mean_ground_score = Some(sum / scored);
            stats.fully_passing = Some(passing as f64 / scored);
        }
    }
    out
}
