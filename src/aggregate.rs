//! Shard aggregation: many execution-result files in, one merged dataset out.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::HarnessError;
use crate::record::{group_by_task, read_jsonl, write_jsonl, CandidateRecord};

/// File pattern used for execution shards when only a directory is given.
pub const DEFAULT_SHARD_PATTERN: &str = "exec_*.jsonl";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub files_read: usize,
    pub lines_read: usize,
    /// Unparsable lines plus records without a (dataset, task_id) pair.
    pub malformed_dropped: usize,
    pub duplicates_removed: usize,
    pub records_written: usize,
    pub task_groups: usize,
}

/// Expand glob patterns and plain paths into a sorted, de-duplicated file list.
pub fn resolve_shards(inputs: &[String]) -> Result<Vec<PathBuf>, HarnessError> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.contains('*') || input.contains('?') || input.contains('[') {
            for entry in glob::glob(input)? {
                match entry {
                    Ok(path) if path.is_file() => paths.push(path),
                    Ok(_) => {}
                    Err(e) => warn!(pattern = %input, error = %e, "Unreadable glob entry"),
                }
            }
        } else {
            paths.push(PathBuf::from(input));
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// Shard files matching `pattern` directly inside `dir`.
pub fn shards_in_dir(dir: impl AsRef<Path>, pattern: &str) -> Result<Vec<PathBuf>, HarnessError> {
    let joined = dir.as_ref().join(pattern);
    resolve_shards(&[joined.to_string_lossy().into_owned()])
}

/// Merge already-parsed shards.
///
/// Keyless records are dropped and counted. Exact duplicates (equal on every
/// field) keep their first occurrence. Output is grouped by task in key order,
/// preserving shard order within each group.
pub fn merge_shards(
    shards: impl IntoIterator<Item = Vec<CandidateRecord>>,
) -> (Vec<CandidateRecord>, AggregateStats) {
    let mut stats = AggregateStats::default();
    let mut seen: HashSet<blake3::Hash> = HashSet::new();
    let mut unique = Vec::new();

    for shard in shards {
        for record in shard {
            if record.key().is_none() {
                stats.malformed_dropped += 1;
                continue;
            }
            if !seen.insert(record.fingerprint()) {
                stats.duplicates_removed += 1;
                continue;
            }
            unique.push(record);
        }
    }

    let (groups, _) = group_by_task(unique);
    stats.task_groups = groups.len();

    let merged: Vec<CandidateRecord> = groups.into_values().flatten().collect();
    stats.records_written = merged.len();
    (merged, stats)
}

/// Read every shard, merge, and write the result to `out` (overwriting it).
pub fn aggregate_files(
    shards: &[PathBuf],
    out: impl AsRef<Path>,
) -> Result<AggregateStats, HarnessError> {
    let out = out.as_ref();
    if shards.is_empty() {
        return Err(HarnessError::invalid_parameter("no shard files to aggregate"));
    }

    let mut files_read = 0usize;
    let mut lines_read = 0usize;
    let mut malformed_lines = 0usize;
    let mut parsed = Vec::with_capacity(shards.len());
    for path in shards {
        let batch = read_jsonl(path)?;
        files_read += 1;
        lines_read += batch.lines;
        malformed_lines += batch.malformed;
        parsed.push(batch.records);
    }

    let (merged, mut stats) = merge_shards(parsed);
    stats.files_read = files_read;
    stats.lines_read = lines_read;
    stats.malformed_dropped += malformed_lines;

    if stats.malformed_dropped > 0 {
        warn!(
            dropped = stats.malformed_dropped,
            "Dropped records without a usable (dataset, task_id)"
        );
    }
    if out.exists() {
        info!(path = %out.display(), "Overwriting existing output");
    }
    stats.records_written = write_jsonl(out, &merged)?;

    info!(
        files = stats.files_read,
        records = stats.records_written,
        groups = stats.task_groups,
        duplicates = stats.duplicates_removed,
        "Aggregated shards"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(dataset: &str, task: &str, score: f64) -> CandidateRecord {
        CandidateRecord::from_value(json!({
            "dataset": dataset,
            "task_id": task,
            "rank": 1,
            "ground_average_test_score": score,
        }))
        .unwrap()
    }

    #[test]
    fn distinct_attempts_are_all_kept() {
        let shard_a = vec![rec("HE_base", "t0", 1.0), rec("HE_base", "t0", 0.5)];
        let shard_b = vec![rec("HE_base", "t0", 0.25)];
        let (merged, stats) = merge_shards(vec![shard_a, shard_b]);
        assert_eq!(merged.len(), 3);
        assert_eq!(stats.duplicates_removed, 0);
        assert_eq!(stats.task_groups, 1);
    }

    #[test]
    fn exact_duplicates_collapse_to_first_occurrence() {
        let shard_a = vec![rec("HE_base", "t0", 1.0), rec("HE_base", "t1", 0.0)];
        let shard_b = vec![rec("HE_base", "t1", 0.0), rec("HE_base", "t1", 0.5)];
        let (merged, stats) = merge_shards(vec![shard_a, shard_b]);
        assert_eq!(merged.len(), 3);
        assert_eq!(stats.duplicates_removed, 1);
        assert_eq!(stats.records_written, 3);
    }

    #[test]
    fn keyless_records_are_counted_not_fatal() {
        let orphan = CandidateRecord::from_value(json!({"task_id": "t0"})).unwrap();
        let (merged, stats) = merge_shards(vec![vec![orphan, rec("MBPP_base", "2", 0.0)]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(stats.malformed_dropped, 1);
    }

    #[test]
    fn repeated_keyless_records_count_as_malformed_not_duplicates() {
        let orphan = CandidateRecord::from_value(json!({"solution": "pass"})).unwrap();
        let shard_a = vec![orphan.clone(), rec("HE_base", "t0", 1.0)];
        let shard_b = vec![orphan.clone(), orphan];
        let (merged, stats) = merge_shards(vec![shard_a, shard_b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(stats.malformed_dropped, 3);
        assert_eq!(stats.duplicates_removed, 0);
    }

    #[test]
    fn output_is_grouped_in_key_order() {
        let shard = vec![
            rec("MBPP_plus", "7", 0.1),
            rec("HE_plus", "a", 0.2),
            rec("MBPP_plus", "7", 0.3),
        ];
        let (merged, _) = merge_shards(vec![shard]);
        let keys: Vec<String> = merged.iter().map(|r| r.key().unwrap().to_string()).collect();
        assert_eq!(keys, vec!["HE_plus/a", "MBPP_plus/7", "MBPP_plus/7"]);
        assert_eq!(merged[1].ground_score(), Some(0.1));
    }
}
