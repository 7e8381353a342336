//! Per-tool stage chains: generate, compile, execute, validate.
//!
//! Every job gets a scratch directory that is removed when the job returns,
//! whichever way it returns. Stages run strictly one after another and the
//! first unexpected outcome settles the verdict.

use crate::catalog::Job;
use crate::classify::check_conversion;
use crate::classify::check_exit;
use crate::classify::check_status;
use crate::classify::classify_executable;
use crate::classify::FailureKind;
use crate::classify::StageCheck;
use crate::classify::Verdict;
use crate::config::Config;
use crate::process::execute;
use crate::process::Invocation;
use crate::process::ProcessRunner;
use crate::process::RunOutput;
use crate::variant::link_flags;
use crate::variant::Variant;
use crate::variant::CHECKER_VARIANTS;
use crate::Result;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
  /// A freestanding test program, run as is.
  Executable,
  /// `rumur`, then compile and run the generated checker.
  Checker(Variant),
  Murphi2c,
  /// `murphi2c --header`
  Murphi2cHeader,
  Murphi2uclid,
  Murphi2xml,
}

impl Tool {
  pub fn suite_name(&self) -> String {
    match self {
      Tool::Executable => "executable".to_string(),
      Tool::Checker(variant) => variant.suite_name(),
      Tool::Murphi2c => "murphi2c".to_string(),
      Tool::Murphi2cHeader => "murphi2c_header".to_string(),
      Tool::Murphi2uclid => "murphi2uclid".to_string(),
      Tool::Murphi2xml => "murphi2xml".to_string(),
    }
  }

  /// Tools every model input is run through, in registration order.
  pub fn model_tools() -> Vec<Tool> {
    let mut tools: Vec<Tool> = CHECKER_VARIANTS.iter().copied().map(Tool::Checker).collect();
    tools.extend([
      Tool::Murphi2c,
      Tool::Murphi2cHeader,
      Tool::Murphi2uclid,
      Tool::Murphi2xml,
    ]);
    tools
  }

  /// A construct in `source` this tool's target language cannot express.
  pub fn unsupported_construct(&self, source: &str) -> Option<&'static str> {
    match self {
      Tool::Murphi2c | Tool::Murphi2cHeader if contains_word(source, "isundefined") => {
        Some("isundefined, which has no C equivalent")
      }
      Tool::Murphi2uclid if source.contains('%') => {
        Some("the modulo operator, which Uclid5 lacks")
      }
      _ => None,
    }
  }
}

/// Whole-word search with the usual identifier boundaries.
pub fn contains_word(haystack: &str, word: &str) -> bool {
  let is_word = |c: char| c.is_alphanumeric() || c == '_';
  haystack.match_indices(word).any(|(start, _)| {
    let before = haystack[..start].chars().next_back();
    let after = haystack[start + word.len()..].chars().next();
    !before.is_some_and(is_word) && !after.is_some_and(is_word)
  })
}

/// Drive one job through its stages and return its verdict.
///
/// Only harness faults (a process that cannot be spawned, a scratch directory
/// that cannot be written) are errors.
pub fn run_job(job: &Job, config: &Config, runner: &dyn ProcessRunner) -> Result<Verdict> {
  if job.tool == Tool::Executable {
    let output = execute(runner, config, &Invocation::new(&job.input.path))?;
    return Ok(classify_executable(&output));
  }

  if let Some(reason) = &job.input.directives.skip_reason {
    return Ok(Verdict::skip(reason.clone()));
  }

  let scratch = tempfile::Builder::new()
    .prefix("rumur-harness-")
    .tempdir()?;
  let stages = Stages {
    job,
    config,
    runner,
    dir: scratch.path(),
  };

  match job.tool {
    Tool::Checker(variant) => stages.checker(variant),
    Tool::Murphi2c => stages.murphi2c(),
    Tool::Murphi2cHeader => stages.murphi2c_header(),
    Tool::Murphi2uclid => stages.murphi2uclid(),
    Tool::Murphi2xml => stages.murphi2xml(),
    Tool::Executable => unreachable!("executables are handled above"),
  }
}

struct Stages<'a> {
  job: &'a Job,
  config: &'a Config,
  runner: &'a dyn ProcessRunner,
  dir: &'a Path,
}

macro_rules! finish_unless_proceed {
  ($check:expr) => {
    if let StageCheck::Finished(verdict) = $check {
      return Ok(verdict);
    }
  };
}

impl Stages<'_> {
  fn run(&self, invocation: Invocation) -> Result<RunOutput> {
    execute(self.runner, self.config, &invocation)
  }

  fn scratch(&self, name: &str) -> PathBuf {
    self.dir.join(name)
  }

  fn checker(&self, variant: Variant) -> Result<Verdict> {
    let input = &self.job.input;
    let directives = &input.directives;
    let tools = self.config.toolchain();

    let model_c = self.scratch("model.c");
    let generate = Invocation::new(&tools.rumur)
      .args(variant.generator_args(
        &input.path,
        &model_c,
        self.config.cpus(),
        &directives.rumur_flags,
      ))
      .instrumented();
    let output = self.run(generate)?;
    finish_unless_proceed!(check_exit("rumur", &output, directives.rumur_exit_code));

    let model_bin = self.scratch("model.exe");
    let compile = Invocation::new(self.config.cc())
      .args(variant.compile_flags(self.config, directives))
      .arg("-o")
      .arg(&model_bin)
      .arg(&model_c)
      .args(link_flags(self.config, directives));
    let output = self.run(compile)?;
    finish_unless_proceed!(check_exit("C compiler", &output, directives.c_exit_code));

    let output = self.run(Invocation::new(&model_bin))?;
    if let Some(failure) = check_status("checker", &output, directives.checker_exit_code) {
      return Ok(failure);
    }

    if let Some(pattern) = &directives.checker_output {
      if !pattern.is_match(&output.stdout) {
        return Ok(Verdict::fail(
          FailureKind::OutputMismatch,
          format_args!("checker output did not match /{}/", pattern.as_str()),
          &output,
        ));
      }
    }

    // `put` statements interleave free text with the XML stream.
    if variant.is_xml() && !contains_word(&input.source, "put") {
      if !self.config.has_xmllint() {
        warn!(job = %self.job.key(), "xmllint not available; skipping validation");
        return Ok(Verdict::skip("xmllint not available"));
      }
      let validation = self.validate_xml(&tools.verifier_schema, &output.stdout)?;
      if validation.exit_code != 0 {
        return Ok(Verdict::fail(
          FailureKind::Validation,
          "failed to XML-validate machine reachable output",
          &validation,
        ));
      }
    }

    Ok(Verdict::Pass)
  }

  /// Run a converter over the job's input, applying the expected-failure
  /// rules shared by all converters.
  fn convert(&self, stage: &str, program: &Path, flags: &[&str]) -> Result<(StageCheck, RunOutput)> {
    let input = &self.job.input;
    let invocation = Invocation::new(program)
      .args(flags.iter().copied())
      .arg(&input.path)
      .instrumented();
    let output = self.run(invocation)?;
    let unsupported = self.job.tool.unsupported_construct(&input.source);
    if let Some(construct) = unsupported {
      debug!(job = %self.job.key(), construct, "converter expected to fail");
    }
    let check = check_conversion(
      stage,
      &output,
      input.directives.rumur_exit_code != 0,
      unsupported,
    );
    Ok((check, output))
  }

  fn murphi2c(&self) -> Result<Verdict> {
    let tools = self.config.toolchain();
    let (check, output) = self.convert("murphi2c", &tools.murphi2c, &[])?;
    finish_unless_proceed!(check);

    let source = self.scratch("model.c");
    fs::write(&source, &output.stdout)?;
    let compile = Invocation::new(self.config.cc())
      .args(self.config.c_flags())
      .arg("-c")
      .arg("-o")
      .arg(self.scratch("model.o"))
      .arg(&source);
    let output = self.run(compile)?;
    let expected = self.job.input.directives.c_exit_code;
    finish_unless_proceed!(check_exit("C compiler", &output, expected));
    Ok(Verdict::Pass)
  }

  fn murphi2c_header(&self) -> Result<Verdict> {
    let tools = self.config.toolchain();
    let (check, output) = self.convert("murphi2c --header", &tools.murphi2c, &["--header"])?;
    finish_unless_proceed!(check);

    let header = self.scratch("header.h");
    fs::write(&header, &output.stdout)?;
    let main_c = format!(
      "#include \"{}\"\nint main(void) {{ return 0; }}\n",
      header.display()
    );

    let c = Invocation::new(self.config.cc())
      .args(self.config.c_flags())
      .arg("-o")
      .arg(self.scratch("header-c.out"))
      .args(["-x", "c", "-"])
      .stdin(main_c.as_str());
    let output = self.run(c)?;
    finish_unless_proceed!(check_exit("C compiler", &output, 0));

    let cxx = Invocation::new(self.config.cxx())
      .arg("-std=c++11")
      .arg("-o")
      .arg(self.scratch("header-cxx.out"))
      .args([
        "-x",
        "c++",
        "-",
        "-Werror=format",
        "-Werror=sign-compare",
        "-Werror=type-limits",
      ])
      .stdin(main_c);
    let output = self.run(cxx)?;
    finish_unless_proceed!(check_exit("C++ compiler", &output, 0));
    Ok(Verdict::Pass)
  }

  fn murphi2uclid(&self) -> Result<Verdict> {
    let tools = self.config.toolchain();
    let (check, output) = self.convert("murphi2uclid", &tools.murphi2uclid, &[])?;
    finish_unless_proceed!(check);

    if !self.config.has_uclid() {
      warn!(job = %self.job.key(), "uclid not available; skipping verification");
      return Ok(Verdict::skip("uclid not available for validation"));
    }

    let source = self.scratch("source.ucl");
    fs::write(&source, &output.stdout)?;
    let output = self.run(Invocation::new(&tools.uclid).arg(&source))?;
    if output.exit_code != 0 {
      return Ok(Verdict::fail(FailureKind::Validation, "uclid failed", &output));
    }
    Ok(Verdict::Pass)
  }

  fn murphi2xml(&self) -> Result<Verdict> {
    let tools = self.config.toolchain();
    let (check, output) = self.convert("murphi2xml", &tools.murphi2xml, &[])?;
    finish_unless_proceed!(check);

    if !self.config.has_xmllint() {
      warn!(job = %self.job.key(), "xmllint not available; skipping validation");
      return Ok(Verdict::skip("xmllint not available for validation"));
    }

    let validation = self.validate_xml(&tools.murphi2xml_schema, &output.stdout)?;
    if validation.exit_code != 0 {
      return Ok(Verdict::fail(
        FailureKind::Validation,
        "failed to validate",
        &validation,
      ));
    }
    Ok(Verdict::Pass)
  }

  fn validate_xml(&self, schema: &Path, content: &str) -> Result<RunOutput> {
    let validate = Invocation::new(&self.config.toolchain().xmllint)
      .arg("--relaxng")
      .arg(schema)
      .args(["--noout", "-"])
      .stdin(content);
    self.run(validate)
  }
}
