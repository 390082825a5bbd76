use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use verifier_harness::{
    generate_candidates, CodeExecutor, CollaboratorError, GenerationOptions, Problem,
    SolutionGenerator,
};

/// Emits fenced completions whose body says how many tests should pass.
struct ScriptedGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl SolutionGenerator for ScriptedGenerator {
    async fn generate(&self, problem: &Problem, n: usize) -> Result<Vec<String>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if problem.task_id.ends_with("/broken") {
            return Err(CollaboratorError::Generation("model refused".to_string()));
        }
        // later problems finish first so completion order differs from key order
        let delay = if problem.task_id.ends_with("/0") { 20 } else { 1 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok((0..n)
            .map(|i| format!("Here you go:\n```python\npass_count = {}\n```", i % 3))
            .collect())
    }
}

/// Passes the first `pass_count` tests; code mentioning `pass_count = 2` crashes.
struct CountingExecutor;

#[async_trait]
impl CodeExecutor for CountingExecutor {
    async fn execute(&self, code: &str, tests: &[String]) -> Result<Vec<bool>, CollaboratorError> {
        let passing: usize = code
            .trim()
            .strip_prefix("pass_count = ")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| CollaboratorError::Execution(format!("bad code: {code}")))?;
        if passing == 2 {
            return Err(CollaboratorError::Execution("sandbox timeout".to_string()));
        }
        Ok((0..tests.len()).map(|i| i < passing).collect())
    }
}

fn problem(task_id: &str, tests: usize) -> Problem {
    Problem {
        dataset: "HE_base".to_string(),
        task_id: task_id.to_string(),
        prompt: "def f():".to_string(),
        tests: (0..tests).map(|i| format!("assert f() == {i}")).collect(),
    }
}

#[tokio::test]
async fn candidates_are_scored_ranked_and_grouped_in_key_order() {
    let generator = ScriptedGenerator {
        calls: AtomicUsize::new(0),
    };
    let problems = vec![
        problem("HumanEval/1", 2),
        problem("HumanEval/0", 2),
        problem("HumanEval/broken", 2),
        problem("HumanEval/empty", 0),
    ];
    let opts = GenerationOptions {
        candidates_per_problem: 6,
        parallel: 4,
    };

    let (records, stats) = generate_candidates(&generator, &CountingExecutor, &problems, &opts).await;

    assert_eq!(stats.problems, 4);
    assert_eq!(stats.problems_skipped, 1);
    assert_eq!(stats.generation_failures, 1);
    // completions 2 and 5 of each successful problem hit the timeout
    assert_eq!(stats.execution_failures, 4);
    assert_eq!(stats.candidates, 8);
    assert_eq!(records.len(), 8);
    // the test-less problem never reaches the generator
    assert_eq!(generator.calls.load(Ordering::SeqCst), 3);

    let tasks: Vec<String> = records.iter().filter_map(|r| r.task_id()).collect();
    assert_eq!(tasks[..4], ["HumanEval/0"; 4]);
    assert_eq!(tasks[4..], ["HumanEval/1"; 4]);

    let first: Vec<(i64, f64)> = records[..4]
        .iter()
        .map(|r| (r.rank().unwrap(), r.ground_score().unwrap()))
        .collect();
    assert_eq!(first, vec![(1, 0.5), (2, 0.5), (3, 0.0), (4, 0.0)]);

    // ties keep generation order: candidates 1 and 4 pass one test each
    let indices: Vec<u64> = records[..4]
        .iter()
        .map(|r| r.get("candidate_index").and_then(|v| v.as_u64()).unwrap())
        .collect();
    assert_eq!(indices, vec![1, 4, 0, 3]);
}

#[tokio::test]
async fn zero_parallelism_still_makes_progress() {
    let generator = ScriptedGenerator {
        calls: AtomicUsize::new(0),
    };
    let opts = GenerationOptions {
        candidates_per_problem: 1,
        parallel: 0,
    };
    let (records, stats) =
        generate_candidates(&generator, &CountingExecutor, &[problem("HumanEval/3", 1)], &opts).await;
    assert_eq!(records.len(), 1);
    assert_eq!(stats.candidates, 1);
    assert_eq!(records[0].ground_score(), Some(0.0));
}
