use crate::catalog::Catalog;
use crate::catalog::Filter;
use crate::classify::Verdict;
use crate::config::Config;
use crate::pipeline::run_job;
use crate::process::ProcessRunner;
use crate::report::HarnessReport;
use crate::report::JobResult;
use crate::Result;
use std::time::Instant;
use tracing::info;
use tracing::info_span;
use tracing::warn;

/// Run every job selected by `filter`, one at a time, in catalog order.
///
/// A job's failure is recorded and the run continues; a harness error stops
/// the run immediately.
pub fn run_catalog(
  catalog: &Catalog,
  config: &Config,
  runner: &dyn ProcessRunner,
  filter: &Filter,
) -> Result<HarnessReport> {
  let mut results = Vec::new();
  for job in catalog.jobs(filter) {
    let key = job.key();
    let span = info_span!("job", %key);
    let _guard = span.enter();

    let started = Instant::now();
    let verdict = run_job(job, config, runner)?;
    let duration_ms = started.elapsed().as_millis().min(u64::MAX as u128) as u64;

    match &verdict {
      Verdict::Pass => info!(duration_ms, "pass"),
      Verdict::Skip { reason } => info!(%reason, "skip"),
      Verdict::Fail { kind, .. } => warn!(%kind, duration_ms, "fail"),
    }

    results.push(JobResult {
      suite: job.suite.clone(),
      id: job.id.clone(),
      path: job.input.path.display().to_string(),
      verdict,
      duration_ms,
    });
  }

  let report = HarnessReport::new(results);
  info!(
    total = report.summary.total,
    failed = report.summary.failed,
    "run complete"
  );
  Ok(report)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::build_filter;
  use crate::catalog::TestInput;
  use crate::config::Toolchain;
  use crate::pipeline::Tool;
  use crate::process::Invocation;
  use crate::process::RunOutput;
  use crate::FailureKind;
  use crate::HarnessError;
  use std::collections::BTreeMap;
  use std::io;
  use std::path::PathBuf;
  use std::sync::Arc;

  /// Exits with the status encoded in the program's file name (`t0`, `t125`);
  /// anything else cannot be spawned.
  struct ByName;

  impl ProcessRunner for ByName {
    fn run(&self, invocation: &Invocation, _env: &[(String, String)]) -> Result<RunOutput> {
      let name = invocation.program.to_string_lossy().into_owned();
      let code = name
        .strip_prefix('t')
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| HarnessError::Spawn {
          program: name.clone(),
          source: io::Error::from(io::ErrorKind::NotFound),
        })?;
      Ok(RunOutput {
        exit_code: code,
        stdout: format!("{name} ran\n"),
        ..RunOutput::default()
      })
    }
  }

  fn config() -> Config {
    Config::new(BTreeMap::new(), Toolchain::default(), 1).unwrap()
  }

  fn executable(catalog: &mut Catalog, name: &str) {
    let input = Arc::new(TestInput::executable(PathBuf::from(name)));
    catalog
      .register(Tool::Executable, &format!("test_{name}"), input)
      .unwrap();
  }

  #[test]
  fn every_selected_job_gets_a_result() {
    let mut catalog = Catalog::new();
    executable(&mut catalog, "t0");
    executable(&mut catalog, "t125");
    executable(&mut catalog, "t3");

    let report = run_catalog(&catalog, &config(), &ByName, &Filter::All).unwrap();
    let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["test_t0", "test_t125", "test_t3"]);
    assert_eq!(report.summary.passed, 1);
    assert_eq!(report.summary.skipped, 1);
    assert_eq!(report.summary.failed, 1);
    assert!(matches!(
      report.results[2].verdict,
      Verdict::Fail {
        kind: FailureKind::ToolInvocation,
        ..
      }
    ));
  }

  #[test]
  fn filter_limits_the_run() {
    let mut catalog = Catalog::new();
    executable(&mut catalog, "t0");
    executable(&mut catalog, "t3");

    let filter = build_filter(Some("executable.test_t0")).unwrap();
    let report = run_catalog(&catalog, &config(), &ByName, &filter).unwrap();
    assert_eq!(report.summary.total, 1);
    assert!(!report.summary.has_failures());
  }

  #[test]
  fn spawn_failure_aborts_the_run() {
    let mut catalog = Catalog::new();
    executable(&mut catalog, "missing");
    let err = run_catalog(&catalog, &config(), &ByName, &Filter::All).unwrap_err();
    assert!(matches!(err, HarnessError::Spawn { .. }));
  }

  #[test]
  fn skipped_models_never_spawn() {
    let input = TestInput::from_source(
      PathBuf::from("slow.m"),
      "-- skip_reason: 'too slow'\nvar x: boolean;\n".to_string(),
    )
    .unwrap();
    let input = Arc::new(input);
    let mut catalog = Catalog::new();
    for tool in Tool::model_tools() {
      catalog.register(tool, "test_slow_m", Arc::clone(&input)).unwrap();
    }

    // `ByName` refuses `rumur`, so any spawn would be an error.
    let report = run_catalog(&catalog, &config(), &ByName, &Filter::All).unwrap();
    assert_eq!(report.summary.skipped, Tool::model_tools().len());
  }

  #[test]
  fn jobs_can_share_one_runner_across_threads() {
    let mut catalog = Catalog::new();
    for name in ["t0", "t1", "t125", "t0b"] {
      executable(&mut catalog, name);
    }
    let config = &config();
    let runner: &dyn ProcessRunner = &ByName;

    let verdicts: Vec<Result<Verdict>> = std::thread::scope(|scope| {
      let handles: Vec<_> = catalog
        .jobs(&Filter::All)
        .map(|job| scope.spawn(move || run_job(job, config, runner)))
        .collect();
      handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect()
    });

    assert!(verdicts[0].as_ref().unwrap().is_pass());
    assert!(verdicts[1].as_ref().unwrap().is_fail());
    assert!(verdicts[2].as_ref().unwrap().is_skip());
    assert!(matches!(verdicts[3], Err(HarnessError::Spawn { .. })));
  }
}
