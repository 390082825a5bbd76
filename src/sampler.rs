//! Rank-based subsampling: keep k candidates per task whose ground-truth ranks
//! are evenly spaced across the task's sorted candidates.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::HarnessError;
use crate::record::{group_by_task, read_jsonl, write_jsonl, CandidateRecord, TaskGroups};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleStats {
    pub k: usize,
    pub groups: usize,
    /// Groups with at most k usable records, returned whole.
    pub groups_below_k: usize,
    pub empty_groups_skipped: usize,
    pub records_in: usize,
    pub records_out: usize,
    /// Records without a key or a finite ground score.
    pub malformed_dropped: usize,
}

/// Sorted positions to keep when choosing `k` of `n` ranked items.
///
/// For `k > 1`, position `i` maps to `round(i * (n - 1) / (k - 1))` with halves
/// rounded up; `k == 1` picks the median `(n - 1) / 2`. Collisions are refilled
/// from the nearest free neighbour, lower index first, so the result always has
/// `min(n, k)` distinct ascending indices.
pub fn spaced_indices(n: usize, k: usize) -> Vec<usize> {
    if n == 0 || k == 0 {
        return Vec::new();
    }
    if n <= k {
        return (0..n).collect();
    }

    let raw: Vec<usize> = if k == 1 {
        vec![(n - 1) / 2]
    } else {
        let denom = 2 * (k - 1);
        (0..k).map(|i| (2 * i * (n - 1) + (k - 1)) / denom).collect()
    };

    let mut selected = BTreeSet::new();
    let mut collided = Vec::new();
    for idx in raw {
        if !selected.insert(idx) {
            collided.push(idx);
        }
    }
    for idx in collided {
        if let Some(fill) = nearest_free(idx, n, &selected) {
            selected.insert(fill);
        }
    }

    selected.into_iter().collect()
}

fn nearest_free(idx: usize, n: usize, taken: &BTreeSet<usize>) -> Option<usize> {
    for d in 1..n {
        if idx >= d && !taken.contains(&(idx - d)) {
            return Some(idx - d);
        }
        if idx + d < n && !taken.contains(&(idx + d)) {
            return Some(idx + d);
        }
    }
    None
}

struct Ranked {
    ground: f64,
    rank: Option<i64>,
    canonical: String,
    record: CandidateRecord,
}

fn compare_ranked(a: &Ranked, b: &Ranked) -> Ordering {
    a.ground
        .total_cmp(&b.ground)
        .then(match (a.rank, b.rank) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.canonical.cmp(&b.canonical))
}

/// Order records by ground score ascending, then incoming rank (ranked records
/// before unranked ones), then content. Records without a finite ground score
/// are returned separately.
pub fn sort_by_ground_truth(
    records: Vec<CandidateRecord>,
) -> (Vec<CandidateRecord>, Vec<CandidateRecord>) {
    let mut ranked = Vec::with_capacity(records.len());
    let mut unusable = Vec::new();
    for record in records {
        match record.ground_score() {
            Some(ground) => ranked.push(Ranked {
                ground,
                rank: record.rank(),
                canonical: record.canonical_json(),
                record,
            }),
            None => unusable.push(record),
        }
    }
    ranked.sort_by(compare_ranked);
    (ranked.into_iter().map(|r| r.record).collect(), unusable)
}

fn check_k(k: usize) -> Result<(), HarnessError> {
    if k == 0 {
        return Err(HarnessError::invalid_parameter("sample size k must be >= 1"));
    }
    Ok(())
}

/// Sample one task group. Returns the subset (ranks rewritten 1..) and the
/// number of records dropped for lacking a ground score.
pub fn sample_group(
    records: Vec<CandidateRecord>,
    k: usize,
) -> Result<(Vec<CandidateRecord>, usize), HarnessError> {
    check_k(k)?;
    let (sorted, unusable) = sort_by_ground_truth(records);
    let keep = spaced_indices(sorted.len(), k);

    let mut picked = Vec::with_capacity(keep.len());
    let mut keep_iter = keep.into_iter().peekable();
    for (idx, record) in sorted.into_iter().enumerate() {
        if keep_iter.peek() == Some(&idx) {
            keep_iter.next();
            picked.push(record);
        }
    }
    for (pos, record) in picked.iter_mut().enumerate() {
        record.set_rank(pos + 1);
    }
    Ok((picked, unusable.len()))
}

/// Sample every group, flattening subsets in key order.
pub fn sample_groups(
    groups: TaskGroups,
    k: usize,
) -> Result<(Vec<CandidateRecord>, SampleStats), HarnessError> {
    check_k(k)?;
    let mut stats = SampleStats {
        k,
        ..SampleStats::default()
    };
    let mut out = Vec::new();

    for (key, records) in groups {
        if records.is_empty() {
            warn!(task = %key, "Skipping empty task group");
            stats.empty_groups_skipped += 1;
            continue;
        }
        stats.groups += 1;
        stats.records_in += records.len();

        let (subset, dropped) = sample_group(records, k)?;
        if dropped > 0 {
            warn!(task = %key, dropped, "Dropped records without a ground score");
            stats.malformed_dropped += dropped;
        }
        if subset.len() < k {
            stats.groups_below_k += 1;
        }
        debug!(task = %key, kept = subset.len(), "Sampled task group");
        stats.records_out += subset.len();
        out.extend(subset);
    }

    Ok((out, stats))
}

/// Group raw records by task, then sample.
pub fn sample_records(
    records: Vec<CandidateRecord>,
    k: usize,
) -> Result<(Vec<CandidateRecord>, SampleStats), HarnessError> {
    check_k(k)?;
    let total = records.len();
    let (groups, keyless) = group_by_task(records);
    let (out, mut stats) = sample_groups(groups, k)?;
    stats.records_in = total;
    stats.malformed_dropped += keyless;
    Ok((out, stats))
}

/// Read a merged dataset, sample k per task, and write the flattened result.
pub fn sample_file(
    input: impl AsRef<Path>,
    out: impl AsRef<Path>,
    k: usize,
) -> Result<SampleStats, HarnessError> {
    check_k(k)?;
    let batch = read_jsonl(input)?;
    let (sampled, mut stats) = sample_records(batch.records, k)?;
    stats.records_in += batch.malformed;
    stats.malformed_dropped += batch.malformed;
    stats.records_out = write_jsonl(out, &sampled)?;

    info!(
        k,
        groups = stats.groups,
        below_k = stats.groups_below_k,
        records_out = stats.records_out,
        "Sampled dataset"
    );
    Ok(stats)
}
