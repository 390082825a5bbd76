#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use verifier_harness::aggregate::{self, DEFAULT_SHARD_PATTERN};
use verifier_harness::config::{load_run_config, RunConfig};
use verifier_harness::dataset_stats::dataset_stats;
use verifier_harness::metrics::evaluate_file;
use verifier_harness::record::read_jsonl;
use verifier_harness::report::{render_csv, render_markdown};
use verifier_harness::sampler::sample_file;
use verifier_harness::scoring::RewardField;
use verifier_harness::tracing_setup::{init_subscriber, Verbosity};

#[derive(Parser)]
#[command(name = "verifier", version, about = "Verifier evaluation harness CLI")]
struct Cli {
    /// Debug-level logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge execution shards into one dataset (overwrites --out)
    Aggregate {
        /// Shard files or glob patterns
        inputs: Vec<String>,
        /// Directory scanned with --pattern
        #[arg(long)]
        input_dir: Option<PathBuf>,
        #[arg(long, default_value = DEFAULT_SHARD_PATTERN)]
        pattern: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Keep k rank-evenly-spaced candidates per task
    Sample {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Candidates per task (default 5)
        #[arg(short = 'k', long)]
        sample_size: Option<usize>,
        /// JSON run config; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Score a verifier against ground truth
    Evaluate {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum)]
        method: Option<CliMethod>,
        #[arg(long, value_enum)]
        reward_field: Option<CliRewardField>,
        /// Min-max rescale scores per task before MAE and R²
        #[arg(long, conflicts_with = "no_normalize_scores")]
        normalize_scores: bool,
        /// Disable normalisation even if the config file enables it
        #[arg(long)]
        no_normalize_scores: bool,
        /// Restrict to these datasets (repeatable)
        #[arg(long = "dataset")]
        datasets: Vec<String>,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Summary JSON output
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        markdown: Option<PathBuf>,
    },
    /// Per-dataset record counts and ground-score averages
    Stats {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliMethod {
    Utg,
    Reward,
}

impl CliMethod {
    fn name(self) -> &'static str {
        match self {
            CliMethod::Utg => "utg",
            CliMethod::Reward => "reward",
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliRewardField {
    Reward,
    RewardScore,
}

impl From<CliRewardField> for RewardField {
    fn from(f: CliRewardField) -> Self {
        match f {
            CliRewardField::Reward => RewardField::Reward,
            CliRewardField::RewardScore => RewardField::RewardScore,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_subscriber(Verbosity::from_flags(cli.verbose, cli.quiet));

    match cli.command {
        Commands::Aggregate {
            inputs,
            input_dir,
            pattern,
            out,
        } => {
            let mut shards = aggregate::resolve_shards(&inputs)?;
            if let Some(dir) = input_dir {
                shards.extend(aggregate::shards_in_dir(&dir, &pattern)?);
                shards.sort();
                shards.dedup();
            }
            if shards.is_empty() {
                return Err("aggregate requires shard paths or an --input-dir with matching files".into());
            }
            let stats = aggregate::aggregate_files(&shards, &out)?;
            println!(
                "merged {} files: {} records in {} task groups ({} duplicates removed, {} malformed dropped)",
                stats.files_read,
                stats.records_written,
                stats.task_groups,
                stats.duplicates_removed,
                stats.malformed_dropped
            );
        }
        Commands::Sample {
            input,
            out,
            sample_size,
            config,
        } => {
            let run_config = base_config(config.as_deref())?.merge(RunConfig {
                sample_size,
                ..RunConfig::default()
            });
            let k = run_config.sample_size()?;
            let stats = sample_file(&input, &out, k)?;
            println!(
                "sampled {} groups with k={}: {} records written ({} groups below k, {} malformed dropped)",
                stats.groups, stats.k, stats.records_out, stats.groups_below_k, stats.malformed_dropped
            );
        }
        Commands::Evaluate {
            input,
            method,
            reward_field,
            normalize_scores,
            no_normalize_scores,
            datasets,
            config,
            out,
            csv,
            markdown,
        } => {
            let run_config = base_config(config.as_deref())?.merge(RunConfig {
                method: method.map(|m| m.name().to_string()),
                reward_field: reward_field.map(RewardField::from),
                sample_size: None,
                normalize_scores: flag_override(normalize_scores, no_normalize_scores),
                datasets: (!datasets.is_empty()).then_some(datasets),
            });
            let opts = run_config.eval_options()?;
            let summary = evaluate_file(&input, &opts)?;

            let table = render_csv(&summary);
            print!("{table}");
            if let Some(path) = out {
                write_json(&path, &summary)?;
            }
            if let Some(path) = csv {
                std::fs::write(path, &table)?;
            }
            if let Some(path) = markdown {
                std::fs::write(path, render_markdown(&summary))?;
            }
        }
        Commands::Stats { input, out } => {
            let batch = read_jsonl(&input)?;
            let stats = dataset_stats(&batch.records);
            for (dataset, s) in &stats {
                let name = if dataset.is_empty() { "<none>" } else { dataset.as_str() };
                println!(
                    "{name}: {} records, {} tasks, mean ground score {}",
                    s.records,
                    s.task_groups,
                    s.mean_ground_score
                        .map(|v| format!("{v:.4}"))
                        .unwrap_or_else(|| "-".to_string())
                );
            }
            if let Some(path) = out {
                write_json(&path, &stats)?;
            }
        }
    }

    Ok(())
}

/// `Some` only when one of a `--flag` / `--no-flag` pair was given.
fn flag_override(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

fn base_config(path: Option<&Path>) -> Result<RunConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(load_run_config(path)?),
        None => Ok(RunConfig::default()),
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), std::io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}
