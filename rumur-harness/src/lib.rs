use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub mod catalog;
pub mod classify;
pub mod config;
pub mod directives;
pub mod literal;
pub mod pipeline;
pub mod process;
pub mod report;
pub mod runner;
pub mod variant;

pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors that abort the harness as a whole.
///
/// Per-job outcomes (including failures of the tools under test) are
/// [`Verdict`]s, never errors.
#[derive(Debug, Error)]
pub enum HarnessError {
  #[error(transparent)]
  Io(#[from] io::Error),
  #[error("{}:{line}: invalid directive: {message}", path.display())]
  Directive {
    path: PathBuf,
    line: usize,
    message: String,
  },
  #[error("probe {}: {message}", path.display())]
  Probe { path: PathBuf, message: String },
  #[error("name collision in suite {suite}: {id} ({})", path.display())]
  DuplicateTest {
    suite: String,
    id: String,
    path: PathBuf,
  },
  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },
  #[error("invalid filter '{0}'")]
  InvalidFilter(String),
  #[error("output failed: {0}")]
  Output(String),
}

pub use catalog::build_filter;
pub use catalog::make_name;
pub use catalog::Catalog;
pub use catalog::Filter;
pub use catalog::Job;
pub use catalog::Suite;
pub use catalog::TestInput;
pub use classify::FailureKind;
pub use classify::Verdict;
pub use config::Config;
pub use config::Toolchain;
pub use directives::parse_directives;
pub use directives::Directive;
pub use directives::Directives;
pub use literal::Literal;
pub use pipeline::run_job;
pub use pipeline::Tool;
pub use process::Invocation;
pub use process::ProcessRunner;
pub use process::RunOutput;
pub use process::SystemRunner;
pub use report::HarnessReport;
pub use report::JobResult;
pub use report::Summary;
pub use runner::run_catalog;
pub use variant::OutputFormat;
pub use variant::Variant;
pub use variant::CHECKER_VARIANTS;
