//! Tracing subscriber setup for the `verifier` binary.
//!
//! Filter priority: `VERIFIER_LOG`, then `RUST_LOG`, then the `-v` / `-q`
//! flags, then `warn`. Logs go to stderr so stdout stays free for tables.

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "VERIFIER_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    /// Verbose wins when both flags are set.
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
        }
    }
}

pub fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
    for var in [LOG_ENV_VAR, "RUST_LOG"] {
        if let Ok(directives) = std::env::var(var) {
            if let Ok(filter) = EnvFilter::try_new(&directives) {
                return filter;
            }
        }
    }
    EnvFilter::new(verbosity.default_level().as_str().to_ascii_lowercase())
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_subscriber(verbosity: Verbosity) {
    let stderr_is_tty = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(stderr_is_tty)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(build_env_filter(verbosity))
        .with(fmt_layer)
        .try_init();
}
