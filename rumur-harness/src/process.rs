use crate::config::Config;
use crate::HarnessError;
use crate::Result;
use std::ffi::OsString;
use std::io::Write;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use tracing::debug;

/// Exit status valgrind is told to use when it finds a leak or memory error.
/// Chosen to be distinct from any status the tools under test use.
pub const MEMCHECK_EXIT_CODE: i32 = 42;

fn memcheck_args() -> Vec<OsString> {
  vec![
    "--leak-check=full".into(),
    "--show-leak-kinds=all".into(),
    format!("--error-exitcode={MEMCHECK_EXIT_CODE}").into(),
  ]
}

/// A command to run, before any instrumentation wrapper is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub program: OsString,
  pub args: Vec<OsString>,
  pub stdin: Option<String>,
  /// Run under the memory checker when the configuration has one.
  pub instrument: bool,
}

impl Invocation {
  pub fn new(program: impl Into<OsString>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      stdin: None,
      instrument: false,
    }
  }

  pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn stdin(mut self, payload: impl Into<String>) -> Self {
    self.stdin = Some(payload.into());
    self
  }

  pub fn instrumented(mut self) -> Self {
    self.instrument = true;
    self
  }

  pub fn display(&self) -> String {
    let mut out = self.program.to_string_lossy().into_owned();
    for arg in &self.args {
      out.push(' ');
      out.push_str(&arg.to_string_lossy());
    }
    out
  }
}

/// What a finished process left behind. Output is decoded lossily.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
  pub exit_code: i32,
  pub stdout: String,
  pub stderr: String,
  /// The memory checker wrapped this run and reported a violation.
  pub memory_violation: bool,
}

impl RunOutput {
  pub fn combined(&self) -> String {
    format!("{}{}", self.stdout, self.stderr)
  }
}

/// Shared by every job of a run, possibly from several threads at once.
pub trait ProcessRunner: Send + Sync {
  /// Spawn `invocation` exactly as given and wait for it, with `env` added to
  /// the inherited environment.
  fn run(&self, invocation: &Invocation, env: &[(String, String)]) -> Result<RunOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
  fn run(&self, invocation: &Invocation, env: &[(String, String)]) -> Result<RunOutput> {
    let program = invocation.program.to_string_lossy().into_owned();
    let spawn_error = |source| HarnessError::Spawn {
      program: program.clone(),
      source,
    };

    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args);
    cmd.envs(env.iter().map(|(k, v)| (k, v)));
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(if invocation.stdin.is_some() {
      Stdio::piped()
    } else {
      Stdio::null()
    });

    let mut child = cmd.spawn().map_err(spawn_error)?;

    // Feed stdin from a separate thread so a child that fills its stdout pipe
    // before draining stdin cannot deadlock us.
    let writer = match (invocation.stdin.clone(), child.stdin.take()) {
      (Some(payload), Some(mut pipe)) => Some(std::thread::spawn(move || {
        // A child that exits without reading its input is not our error.
        let _ = pipe.write_all(payload.as_bytes());
      })),
      _ => None,
    };

    let output = child.wait_with_output().map_err(spawn_error)?;
    if let Some(writer) = writer {
      let _ = writer.join();
    }

    Ok(RunOutput {
      exit_code: exit_code(output.status),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
      memory_violation: false,
    })
  }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
  use std::os::unix::process::ExitStatusExt;
  status
    .code()
    .unwrap_or_else(|| -status.signal().unwrap_or(1))
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
  status.code().unwrap_or(-1)
}

/// Prepare `invocation` for the configured environment and run it.
///
/// Configuration facts are exported into the child's environment. When the
/// invocation asks for instrumentation and valgrind is available, the command
/// is run under it, and the sentinel exit status is reported as a memory
/// violation instead of an ordinary exit code.
pub fn execute(
  runner: &dyn ProcessRunner,
  config: &Config,
  invocation: &Invocation,
) -> Result<RunOutput> {
  let wrapped = invocation.instrument && config.has_valgrind();
  let prepared = if wrapped {
    let mut args = memcheck_args();
    args.push(invocation.program.clone());
    args.extend(invocation.args.iter().cloned());
    Invocation {
      program: config.toolchain().valgrind.clone().into_os_string(),
      args,
      stdin: invocation.stdin.clone(),
      instrument: false,
    }
  } else {
    invocation.clone()
  };
  let env: Vec<(String, String)> = config
    .env_vars()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

  debug!(command = %prepared.display(), "run");
  let mut output = runner.run(&prepared, &env)?;
  output.memory_violation = wrapped && output.exit_code == MEMCHECK_EXIT_CODE;
  debug!(
    exit_code = output.exit_code,
    memory_violation = output.memory_violation,
    "finished"
  );
  Ok(output)
}
