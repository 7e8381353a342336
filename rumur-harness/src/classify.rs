use crate::process::RunOutput;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Exit status a freestanding test program uses to ask to be skipped.
pub const SKIP_EXIT_CODE: i32 = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// A stage exited with a status other than the one expected.
  ToolInvocation,
  /// The memory checker reported a leak or memory error.
  MemorySafetyViolation,
  /// The checker's output did not match the expected pattern.
  OutputMismatch,
  /// Schema or secondary verifier rejected the output.
  Validation,
}

impl fmt::Display for FailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      FailureKind::ToolInvocation => "tool invocation",
      FailureKind::MemorySafetyViolation => "memory safety violation",
      FailureKind::OutputMismatch => "output mismatch",
      FailureKind::Validation => "validation",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
  Pass,
  Fail {
    kind: FailureKind,
    diagnostic: String,
  },
  Skip {
    reason: String,
  },
}

impl Verdict {
  pub fn fail(kind: FailureKind, headline: impl fmt::Display, output: &RunOutput) -> Verdict {
    Verdict::Fail {
      kind,
      diagnostic: format!("{headline}:\n{}", output.combined()),
    }
  }

  pub fn skip(reason: impl Into<String>) -> Verdict {
    Verdict::Skip {
      reason: reason.into(),
    }
  }

  pub fn is_pass(&self) -> bool {
    matches!(self, Verdict::Pass)
  }

  pub fn is_fail(&self) -> bool {
    matches!(self, Verdict::Fail { .. })
  }

  pub fn is_skip(&self) -> bool {
    matches!(self, Verdict::Skip { .. })
  }
}

/// Result of checking one stage against its expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageCheck {
  /// Exited 0 as expected; later stages should run.
  Proceed,
  /// No later stage may run; the job's verdict is settled.
  Finished(Verdict),
}

/// Compare one stage's exit status with the expected one.
///
/// A memory violation always fails, whatever the stage was expected to do. A
/// mismatched status fails with the stage's output. A matching nonzero status
/// is an expected failure: the job passes and nothing after it runs.
pub fn check_exit(stage: &str, output: &RunOutput, expected: i32) -> StageCheck {
  if let Some(failure) = check_status(stage, output, expected) {
    return StageCheck::Finished(failure);
  }
  if expected != 0 {
    return StageCheck::Finished(Verdict::Pass);
  }
  StageCheck::Proceed
}

/// Like [`check_exit`], but a matching nonzero status does not end the job.
/// Used for the executed checker, whose output is still inspected afterwards.
pub fn check_status(stage: &str, output: &RunOutput, expected: i32) -> Option<Verdict> {
  if output.memory_violation {
    return Some(memory_violation(stage, output));
  }
  if output.exit_code != expected {
    return Some(Verdict::fail(
      FailureKind::ToolInvocation,
      format_args!("unexpected {stage} exit status {}", output.exit_code),
      output,
    ));
  }
  None
}

/// Check a converter run.
///
/// `may_fail` is set when the generator itself is expected to reject the
/// input. `unsupported` names a construct in the input the converter's target
/// cannot express; the converter must then fail, and that failure passes.
pub fn check_conversion(
  stage: &str,
  output: &RunOutput,
  may_fail: bool,
  unsupported: Option<&str>,
) -> StageCheck {
  if output.memory_violation {
    return StageCheck::Finished(memory_violation(stage, output));
  }
  match (unsupported, output.exit_code) {
    (Some(construct), 0) => StageCheck::Finished(Verdict::fail(
      FailureKind::ToolInvocation,
      format_args!("unexpected {stage} exit status 0 on input using {construct}"),
      output,
    )),
    (None, code) if code != 0 && !may_fail => StageCheck::Finished(Verdict::fail(
      FailureKind::ToolInvocation,
      format_args!("unexpected {stage} exit status {code}"),
      output,
    )),
    (_, 0) => StageCheck::Proceed,
    _ => StageCheck::Finished(Verdict::Pass),
  }
}

pub fn memory_violation(stage: &str, output: &RunOutput) -> Verdict {
  Verdict::fail(
    FailureKind::MemorySafetyViolation,
    format_args!("memory leak in {stage}"),
    output,
  )
}

/// Verdict for a freestanding executable test case.
pub fn classify_executable(output: &RunOutput) -> Verdict {
  match output.exit_code {
    0 => Verdict::Pass,
    SKIP_EXIT_CODE => Verdict::skip(output.combined().trim()),
    code => Verdict::fail(
      FailureKind::ToolInvocation,
      format_args!("test exited with status {code}"),
      output,
    ),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn output(exit_code: i32) -> RunOutput {
    RunOutput {
      exit_code,
      stdout: "out\n".to_string(),
      stderr: "err\n".to_string(),
      memory_violation: false,
    }
  }

  #[test]
  fn zero_as_expected_proceeds() {
    assert_eq!(check_exit("rumur", &output(0), 0), StageCheck::Proceed);
  }

  #[test]
  fn expected_nonzero_finishes_with_pass() {
    assert_eq!(
      check_exit("rumur", &output(1), 1),
      StageCheck::Finished(Verdict::Pass)
    );
  }

  #[test]
  fn mismatch_carries_stdout_then_stderr() {
    let StageCheck::Finished(Verdict::Fail { kind, diagnostic }) =
      check_exit("C compiler", &output(1), 0)
    else {
      panic!("expected a failure");
    };
    assert_eq!(kind, FailureKind::ToolInvocation);
    assert!(diagnostic.starts_with("unexpected C compiler exit status 1"));
    assert!(diagnostic.ends_with("out\nerr\n"));
  }

  #[test]
  fn memory_violation_wins_over_matching_expectation() {
    let mut leaked = output(42);
    leaked.memory_violation = true;
    let check = check_exit("rumur", &leaked, 42);
    assert!(matches!(
      check,
      StageCheck::Finished(Verdict::Fail {
        kind: FailureKind::MemorySafetyViolation,
        ..
      })
    ));
  }

  #[test]
  fn checker_status_mismatch_fails_but_match_does_not_finish() {
    assert_eq!(check_status("checker", &output(1), 1), None);
    assert!(check_status("checker", &output(0), 1).unwrap().is_fail());
  }

  #[test]
  fn conversion_gate() {
    let construct = Some("isundefined");
    // Target cannot express the input: failing is the only correct outcome.
    assert_eq!(
      check_conversion("murphi2c", &output(1), false, construct),
      StageCheck::Finished(Verdict::Pass)
    );
    assert!(matches!(
      check_conversion("murphi2c", &output(0), false, construct),
      StageCheck::Finished(Verdict::Fail { .. })
    ));
    // Generator expected to reject the model: the converter may fail too.
    assert_eq!(
      check_conversion("murphi2c", &output(1), true, None),
      StageCheck::Finished(Verdict::Pass)
    );
    assert_eq!(
      check_conversion("murphi2c", &output(0), true, None),
      StageCheck::Proceed
    );
    assert!(matches!(
      check_conversion("murphi2c", &output(2), false, None),
      StageCheck::Finished(Verdict::Fail { .. })
    ));
  }

  #[test]
  fn executable_exit_codes() {
    assert_eq!(classify_executable(&output(0)), Verdict::Pass);
    assert_eq!(
      classify_executable(&output(SKIP_EXIT_CODE)),
      Verdict::skip("out\nerr")
    );
    assert!(classify_executable(&output(1)).is_fail());
  }

  #[test]
  fn verdicts_serialize_with_status_tag() {
    let json = serde_json::to_string(&Verdict::skip("no uclid")).unwrap();
    assert_eq!(json, r#"{"status":"skip","reason":"no uclid"}"#);
  }
}
