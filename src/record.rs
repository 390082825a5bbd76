//! Candidate records, task grouping and JSON Lines I/O.
//!
//! A [`CandidateRecord`] is one generated solution for one task. Only a handful
//! of keys carry meaning for the harness; everything else rides along untouched
//! so that no stage drops or renames a field.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::HarnessError;

pub const DATASET_KEY: &str = "dataset";
pub const TASK_ID_KEY: &str = "task_id";
pub const RANK_KEY: &str = "rank";
pub const GROUND_SCORE_KEY: &str = "ground_average_test_score";

/// One candidate solution with all of its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateRecord {
    fields: Map<String, Value>,
}

impl CandidateRecord {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build a record from any JSON value; only objects qualify.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(key.into(), value)
    }

    pub fn dataset(&self) -> Option<&str> {
        self.fields.get(DATASET_KEY).and_then(Value::as_str)
    }

    /// Task id as text. MBPP-style integer ids are accepted and rendered in decimal.
    pub fn task_id(&self) -> Option<String> {
        match self.fields.get(TASK_ID_KEY)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
            _ => None,
        }
    }

    /// Grouping key, or `None` when either half is missing or null.
    pub fn key(&self) -> Option<TaskKey> {
        Some(TaskKey {
            dataset: self.dataset()?.to_string(),
            task_id: self.task_id()?,
        })
    }

    pub fn rank(&self) -> Option<i64> {
        let value = self.fields.get(RANK_KEY)?;
        if let Some(rank) = value.as_i64() {
            return Some(rank);
        }
        let float = value.as_f64()?;
        (float.fract() == 0.0 && float.is_finite()).then_some(float as i64)
    }

    pub fn set_rank(&mut self, rank: usize) {
        self.fields.insert(RANK_KEY.to_string(), Value::from(rank));
    }

    pub fn ground_score(&self) -> Option<f64> {
        self.number(GROUND_SCORE_KEY)
    }

    /// Finite numeric value stored under `key`.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.fields
            .get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    }

    /// Serialized form with keys in sorted order; equal records give equal text.
    pub fn canonical_json(&self) -> String {
        // serde_json::Map is a BTreeMap unless `preserve_order` is enabled, which
        // this crate never does.
        serde_json::to_string(&self.fields).unwrap_or_default()
    }

    pub fn fingerprint(&self) -> blake3::Hash {
        blake3::hash(self.canonical_json().as_bytes())
    }
}

/// Composite grouping key `(dataset, task_id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub dataset: String,
    pub task_id: String,
}

impl TaskKey {
    pub fn new(dataset: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            task_id: task_id.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dataset, self.task_id)
    }
}

/// Task groups in key order. Records keep their input order inside a group.
pub type TaskGroups = BTreeMap<TaskKey, Vec<CandidateRecord>>;

/// Group records by task. Returns the groups and the number of keyless records.
pub fn group_by_task(records: impl IntoIterator<Item = CandidateRecord>) -> (TaskGroups, usize) {
    let mut groups = TaskGroups::new();
    let mut keyless = 0usize;
    for record in records {
        match record.key() {
            Some(key) => groups.entry(key).or_default().push(record),
            None => keyless += 1,
        }
    }
    (groups, keyless)
}

/// Records parsed from one JSON Lines file.
#[derive(Debug, Default)]
pub struct JsonlBatch {
    pub records: Vec<CandidateRecord>,
    /// Non-blank lines seen.
    pub lines: usize,
    /// Lines that were not UTF-8 JSON objects.
    pub malformed: usize,
}

/// Read one record per line. Blank lines are skipped; unparsable lines are
/// counted and logged, never fatal.
pub fn read_jsonl(path: impl AsRef<Path>) -> Result<JsonlBatch, HarnessError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| HarnessError::io(path, e))?;
    let mut reader = BufReader::new(file);

    let mut batch = JsonlBatch::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| HarnessError::io(path, e))?;
        if read == 0 {
            break;
        }
        line_no += 1;
        let parsed = match std::str::from_utf8(&buf) {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                serde_json::from_str::<Value>(trimmed)
                    .map_err(|e| e.to_string())
                    .and_then(|v| {
                        CandidateRecord::from_value(v).ok_or_else(|| "not an object".to_string())
                    })
            }
            Err(e) => Err(format!("invalid UTF-8: {e}")),
        };
        batch.lines += 1;
        match parsed {
            Ok(record) => batch.records.push(record),
            Err(reason) => {
                batch.malformed += 1;
                let e = HarnessError::malformed(format!("{}:{line_no}", path.display()), reason);
                warn!(code = e.code(), error = %e, "Skipping malformed line");
            }
        }
    }
    Ok(batch)
}

/// Write records one per line, replacing any existing file. Returns the count written.
pub fn write_jsonl<'a>(
    path: impl AsRef<Path>,
    records: impl IntoIterator<Item = &'a CandidateRecord>,
) -> Result<usize, HarnessError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| HarnessError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0usize;
    for record in records {
        let line = serde_json::to_string(record)?;
        writeln!(writer, "{line}").map_err(|e| HarnessError::io(path, e))?;
        written += 1;
    }
    writer.flush().map_err(|e| HarnessError::io(path, e))?;
    Ok(written)
}
