#![forbid(unsafe_code)]

//! # verifier-harness
//!
//! Offline tooling for judging code-generation verifiers. Candidate solutions
//! for each benchmark task carry a ground-truth pass fraction on hidden tests;
//! a verifier (pass rate on generated tests, or a reward model) scores the same
//! candidates. The harness measures how well the second ranks like the first.
//!
//! Stages, each a batch transformation over JSON Lines files:
//! 1. [`aggregate`]: merge execution shards, dropping keyless records and exact
//!    duplicates.
//! 2. [`sampler`]: keep k candidates per task, evenly spaced by ground-truth rank.
//! 3. [`metrics`]: Top-1, Bottom-1, Spearman, Kendall tau-b, MAE and R² per task
//!    and in aggregate.
//!
//! Generation itself sits behind the traits in [`generate`].

pub mod aggregate;
pub mod config;
pub mod dataset_stats;
pub mod error;
pub mod generate;
pub mod metrics;
pub mod record;
pub mod report;
pub mod sampler;
pub mod scoring;
pub mod stats;
pub mod tracing_setup;

pub use aggregate::{aggregate_files, merge_shards, resolve_shards, AggregateStats};
pub use config::{load_run_config, RunConfig};
pub use error::HarnessError;
pub use generate::{
    generate_candidates, CodeExecutor, CollaboratorError, GenerationOptions, GenerationStats,
    Problem, SolutionGenerator,
};
pub use metrics::{
    evaluate_file, evaluate_groups, evaluate_records, EvalOptions, EvaluationSummary,
    GroupSummary, Metric, MetricValues,
};
pub use record::{group_by_task, read_jsonl, write_jsonl, CandidateRecord, TaskGroups, TaskKey};
pub use sampler::{sample_file, sample_group, sample_records, spaced_indices, SampleStats};
pub use scoring::{RewardField, ScoringMethod};
