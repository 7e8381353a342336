use crate::classify::FailureKind;
use crate::classify::Verdict;
use crate::HarnessError;
use crate::Result;
use serde::Deserialize;
use serde::Serialize;
use std::io::Write;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobResult {
  pub suite: String,
  pub id: String,
  pub path: String,
  #[serde(flatten)]
  pub verdict: Verdict,
  pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
  pub total: usize,
  pub passed: usize,
  pub failed: usize,
  pub skipped: usize,
  /// Failures caused by the memory checker; also counted in `failed`.
  pub memory_violations: usize,
}

impl Summary {
  pub fn from_results(results: &[JobResult]) -> Summary {
    let mut summary = Summary {
      total: results.len(),
      ..Summary::default()
    };
    for result in results {
      match &result.verdict {
        Verdict::Pass => summary.passed += 1,
        Verdict::Skip { .. } => summary.skipped += 1,
        Verdict::Fail { kind, .. } => {
          summary.failed += 1;
          if *kind == FailureKind::MemorySafetyViolation {
            summary.memory_violations += 1;
          }
        }
      }
    }
    summary
  }

  pub fn has_failures(&self) -> bool {
    self.failed > 0
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessReport {
  pub schema_version: u32,
  pub summary: Summary,
  pub results: Vec<JobResult>,
}

impl HarnessReport {
  pub fn new(results: Vec<JobResult>) -> Self {
    Self {
      schema_version: REPORT_SCHEMA_VERSION,
      summary: Summary::from_results(&results),
      results,
    }
  }

  pub fn write_json<W: Write>(&self, writer: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, self)
      .map_err(|err| HarnessError::Output(err.to_string()))?;
    writeln!(writer)?;
    Ok(())
  }

  /// Failures with their diagnostics, then one line of totals.
  pub fn write_human<W: Write>(&self, writer: &mut W) -> Result<()> {
    for result in &self.results {
      if let Verdict::Fail { kind, diagnostic } = &result.verdict {
        writeln!(writer, "FAIL: {}.{} ({kind})", result.suite, result.id)?;
        writeln!(writer, "{}", diagnostic.trim_end())?;
        writeln!(writer)?;
      }
    }
    let summary = &self.summary;
    writeln!(writer, "Ran {} test(s)", summary.total)?;
    writeln!(
      writer,
      "Passed: {}, Failed: {}, Skipped: {}, Memory violations: {}",
      summary.passed, summary.failed, summary.skipped, summary.memory_violations
    )?;
    Ok(())
  }
}
