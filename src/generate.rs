//! Candidate generation surface.
//!
//! Inference and sandboxed execution live outside this crate. They plug in
//! through [`SolutionGenerator`] and [`CodeExecutor`]; [`generate_candidates`]
//! drives them across problems and turns the outcomes into shard records.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::record::{CandidateRecord, TaskKey};

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("execution failed: {0}")]
    Execution(String),
}

/// One benchmark problem with its hidden ground-truth tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub dataset: String,
    pub task_id: String,
    pub prompt: String,
    pub tests: Vec<String>,
}

impl Problem {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.dataset, &self.task_id)
    }
}

#[async_trait]
pub trait SolutionGenerator: Send + Sync {
    /// Up to `n` raw completions for `problem`.
    async fn generate(&self, problem: &Problem, n: usize) -> Result<Vec<String>, CollaboratorError>;
}

#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Pass/fail per test, in test order.
    async fn execute(&self, code: &str, tests: &[String]) -> Result<Vec<bool>, CollaboratorError>;
}

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub candidates_per_problem: usize,
    /// Problems in flight at once.
    pub parallel: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            candidates_per_problem: 5,
            parallel: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationStats {
    pub problems: usize,
    /// Problems without tests; no pass fraction exists for them.
    pub problems_skipped: usize,
    pub generation_failures: usize,
    pub execution_failures: usize,
    pub candidates: usize,
}

/// Strip a fenced code block (```` ```python ... ``` ````) if one is present.
pub fn extract_code_block(content: &str) -> String {
    let Some(start) = content.find("```") else {
        return content.trim().to_string();
    };
    let body_start = start + 3;
    let body_end = content[body_start..]
        .find("```")
        .map_or(content.len(), |end| body_start + end);
    let body = content[body_start..body_end].trim();
    body.strip_prefix("python").unwrap_or(body).trim().to_string()
}

/// Share of passing tests; `None` for an empty outcome list.
pub fn pass_fraction(outcomes: &[bool]) -> Option<f64> {
    if outcomes.is_empty() {
        return None;
    }
    let passed = outcomes.iter().filter(|&&ok| ok).count();
    Some(passed as f64 / outcomes.len() as f64)
}

struct Candidate {
    /// Position in the generator's output.
    index: usize,
    code: String,
    passed: usize,
    total: usize,
    score: f64,
}

enum ProblemOutcome {
    Skipped,
    GenerationFailed,
    Done {
        key: TaskKey,
        candidates: Vec<Candidate>,
        execution_failures: usize,
    },
}

async fn run_problem<G, E>(
    generator: &G,
    executor: &E,
    problem: &Problem,
    n: usize,
) -> ProblemOutcome
where
    G: SolutionGenerator + ?Sized,
    E: CodeExecutor + ?Sized,
{
    if problem.tests.is_empty() {
        warn!(task = %problem.key(), "Problem has no tests; skipping");
        return ProblemOutcome::Skipped;
    }

    let completions = match generator.generate(problem, n).await {
        Ok(completions) => completions,
        Err(e) => {
            warn!(task = %problem.key(), error = %e, "Generation failed");
            return ProblemOutcome::GenerationFailed;
        }
    };

    let mut candidates = Vec::with_capacity(completions.len());
    let mut execution_failures = 0usize;
    for (index, raw) in completions.iter().take(n).enumerate() {
        let code = extract_code_block(raw);
        match executor.execute(&code, &problem.tests).await {
            Ok(outcomes) if outcomes.len() == problem.tests.len() => {
                if let Some(score) = pass_fraction(&outcomes) {
                    candidates.push(Candidate {
                        index,
                        code,
                        passed: outcomes.iter().filter(|&&ok| ok).count(),
                        total: outcomes.len(),
                        score,
                    });
                }
            }
            Ok(outcomes) => {
                warn!(
                    task = %problem.key(),
                    expected = problem.tests.len(),
                    got = outcomes.len(),
                    "Executor returned wrong number of outcomes"
                );
                execution_failures += 1;
            }
            Err(e) => {
                warn!(task = %problem.key(), error = %e, "Execution failed");
                execution_failures += 1;
            }
        }
    }

    ProblemOutcome::Done {
        key: problem.key(),
        candidates,
        execution_failures,
    }
}

/// Generate and execute candidates for every problem.
///
/// Problems run concurrently (bounded by `parallel`); candidates within one
/// problem execute in order. Each record carries the pass fraction as
/// `ground_average_test_score` and a generation-time `rank` (1 = best, ties in
/// generation order). Records come back grouped in task-key order. Failed
/// candidates are absent and counted; nothing is retried.
pub async fn generate_candidates<G, E>(
    generator: &G,
    executor: &E,
    problems: &[Problem],
    opts: &GenerationOptions,
) -> (Vec<CandidateRecord>, GenerationStats)
where
    G: SolutionGenerator + ?Sized,
    E: CodeExecutor + ?Sized,
{
    let n = opts.candidates_per_problem;
    let outcomes: Vec<ProblemOutcome> = stream::iter(problems)
        .map(|problem| run_problem(generator, executor, problem, n))
        .buffer_unordered(opts.parallel.max(1))
        .collect()
        .await;

    let mut stats = GenerationStats {
        problems: problems.len(),
        ..GenerationStats::default()
    };
    let mut done = Vec::new();
    for outcome in outcomes {
        match outcome {
            ProblemOutcome::Skipped => stats.problems_skipped += 1,
            ProblemOutcome::GenerationFailed => stats.generation_failures += 1,
            ProblemOutcome::Done {
                key,
                candidates,
                execution_failures,
            } => {
                stats.execution_failures += execution_failures;
                done.push((key, candidates));
            }
        }
    }
    done.sort_by(|a, b| a.0.cmp(&b.0));

    let mut records = Vec::new();
    for (key, candidates) in done {
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        // stable: equal pass fractions keep generation order
        order.sort_by(|&a, &b| candidates[b].score.total_cmp(&candidates[a].score));
        for (pos, &idx) in order.iter().enumerate() {
            let candidate = &candidates[idx];
            let value = json!({
                "dataset": key.dataset,
                "task_id": key.task_id,
                "candidate_index": candidate.index,
                "solution": candidate.code,
                "passed_tests": candidate.passed,
                "total_tests": candidate.total,
                "ground_average_test_score": candidate.score,
                "rank": pos + 1,
            });
            if let Some(record) = CandidateRecord::from_value(value) {
                records.push(record);
            }
        }
        debug!(task = %key, candidates = candidates.len(), "Generated candidates");
        stats.candidates += candidates.len();
    }

    (records, stats)
}
