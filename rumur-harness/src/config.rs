//! Toolchain facts gathered once, before any test runs.
//!
//! Every executable file in the probe directory is run with no arguments and
//! must print a single literal. The probe's file name becomes the fact's key.

use crate::literal::parse_literal;
use crate::literal::Literal;
use crate::HarnessError;
use crate::Result;
use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;
use tracing::info;
use walkdir::WalkDir;

pub const CC: &str = "CC";
pub const CXX: &str = "CXX";
pub const C_FLAGS: &str = "C_FLAGS";
pub const HAS_VALGRIND: &str = "HAS_VALGRIND";
pub const HAS_XMLLINT: &str = "HAS_XMLLINT";
pub const HAS_UCLID: &str = "HAS_UCLID";
pub const NEEDS_LIBATOMIC: &str = "NEEDS_LIBATOMIC";

/// Locations of the programs and schemas the pipeline invokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
  pub rumur: PathBuf,
  pub murphi2c: PathBuf,
  pub murphi2uclid: PathBuf,
  pub murphi2xml: PathBuf,
  pub valgrind: PathBuf,
  pub xmllint: PathBuf,
  pub uclid: PathBuf,
  pub verifier_schema: PathBuf,
  pub murphi2xml_schema: PathBuf,
}

impl Default for Toolchain {
  fn default() -> Self {
    Self {
      rumur: "rumur".into(),
      murphi2c: "murphi2c".into(),
      murphi2uclid: "murphi2uclid".into(),
      murphi2xml: "murphi2xml".into(),
      valgrind: "valgrind".into(),
      xmllint: "xmllint".into(),
      uclid: "uclid".into(),
      verifier_schema: PathBuf::from("../misc/verifier.rng"),
      murphi2xml_schema: PathBuf::from("../misc/murphi2xml.rng"),
    }
  }
}

impl Toolchain {
  /// Default toolchain with schema paths resolved next to a test root.
  pub fn for_root(root: &Path) -> Self {
    let misc = root.join("..").join("misc");
    Self {
      verifier_schema: misc.join("verifier.rng"),
      murphi2xml_schema: misc.join("murphi2xml.rng"),
      ..Self::default()
    }
  }
}

#[derive(Debug, Clone)]
pub struct Config {
  facts: BTreeMap<String, Literal>,
  cc: String,
  cxx: String,
  c_flags: Vec<String>,
  has_valgrind: bool,
  has_xmllint: bool,
  has_uclid: bool,
  needs_libatomic: bool,
  cpus: usize,
  toolchain: Toolchain,
}

impl Config {
  /// Run every probe in `probe_dir` and build the configuration.
  ///
  /// A missing probe directory yields the defaults for every fact.
  pub fn discover(probe_dir: &Path, toolchain: Toolchain) -> Result<Config> {
    let facts = run_probes(probe_dir)?;
    Config::new(facts, toolchain, num_cpus::get())
  }

  pub fn new(
    facts: BTreeMap<String, Literal>,
    toolchain: Toolchain,
    cpus: usize,
  ) -> Result<Config> {
    let view = FactView { facts: &facts };
    let config = Config {
      cc: view.string(CC, "cc")?,
      cxx: view.string(CXX, "c++")?,
      c_flags: view.list(C_FLAGS)?,
      has_valgrind: view.flag(HAS_VALGRIND)?,
      has_xmllint: view.flag(HAS_XMLLINT)?,
      has_uclid: view.flag(HAS_UCLID)?,
      needs_libatomic: view.flag(NEEDS_LIBATOMIC)?,
      cpus: cpus.max(1),
      toolchain,
      facts,
    };
    info!(
      cc = %config.cc,
      valgrind = config.has_valgrind,
      xmllint = config.has_xmllint,
      uclid = config.has_uclid,
      cpus = config.cpus,
      "configuration loaded"
    );
    Ok(config)
  }

  pub fn cc(&self) -> &str {
    &self.cc
  }

  pub fn cxx(&self) -> &str {
    &self.cxx
  }

  pub fn c_flags(&self) -> &[String] {
    &self.c_flags
  }

  pub fn has_valgrind(&self) -> bool {
    self.has_valgrind
  }

  pub fn has_xmllint(&self) -> bool {
    self.has_xmllint
  }

  pub fn has_uclid(&self) -> bool {
    self.has_uclid
  }

  pub fn needs_libatomic(&self) -> bool {
    self.needs_libatomic
  }

  /// Logical processors on the host.
  pub fn cpus(&self) -> usize {
    self.cpus
  }

  pub fn toolchain(&self) -> &Toolchain {
    &self.toolchain
  }

  pub fn fact(&self, name: &str) -> Option<&Literal> {
    self.facts.get(name)
  }

  /// Facts exported into the environment of every child process.
  pub fn env_vars(&self) -> impl Iterator<Item = (&str, String)> + '_ {
    self
      .facts
      .iter()
      .map(|(name, value)| (name.as_str(), value.env_value()))
  }
}

struct FactView<'a> {
  facts: &'a BTreeMap<String, Literal>,
}

impl FactView<'_> {
  fn mismatch(&self, name: &str, expected: &str, found: &Literal) -> HarnessError {
    HarnessError::Probe {
      path: PathBuf::from(name),
      message: format!("expected {expected}, found {}", found.kind()),
    }
  }

  fn string(&self, name: &str, default: &str) -> Result<String> {
    match self.facts.get(name) {
      None => Ok(default.to_string()),
      Some(value) => value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| self.mismatch(name, "a string", value)),
    }
  }

  fn list(&self, name: &str) -> Result<Vec<String>> {
    match self.facts.get(name) {
      None => Ok(Vec::new()),
      Some(value) => value
        .as_list()
        .map(|items| items.to_vec())
        .ok_or_else(|| self.mismatch(name, "a list of strings", value)),
    }
  }

  fn flag(&self, name: &str) -> Result<bool> {
    match self.facts.get(name) {
      None => Ok(false),
      Some(value) => value
        .as_bool()
        .ok_or_else(|| self.mismatch(name, "a boolean", value)),
    }
  }
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;
  std::fs::metadata(path)
    .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
    .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(_path: &Path) -> bool {
  false
}

fn run_probes(probe_dir: &Path) -> Result<BTreeMap<String, Literal>> {
  let mut facts = BTreeMap::new();
  if !probe_dir.is_dir() {
    debug!(dir = %probe_dir.display(), "no probe directory; using defaults");
    return Ok(facts);
  }

  for entry in WalkDir::new(probe_dir)
    .min_depth(1)
    .max_depth(1)
    .sort_by_file_name()
  {
    let entry = entry.map_err(|err| HarnessError::Probe {
      path: probe_dir.to_path_buf(),
      message: err.to_string(),
    })?;
    let path = entry.into_path();
    if path.is_dir() || !is_executable(&path) {
      continue;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
      continue;
    };
    let value = run_probe(&path)?;
    debug!(probe = %name, value = %value, "probe");
    facts.insert(name, value);
  }
  Ok(facts)
}

fn run_probe(path: &Path) -> Result<Literal> {
  let output = Command::new(path).output().map_err(|err| HarnessError::Probe {
    path: path.to_path_buf(),
    message: format!("failed to run: {err}"),
  })?;
  if !output.status.success() {
    return Err(HarnessError::Probe {
      path: path.to_path_buf(),
      message: format!(
        "exited with status {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
      ),
    });
  }
  let stdout = String::from_utf8_lossy(&output.stdout);
  parse_literal(stdout.trim()).map_err(|err| HarnessError::Probe {
    path: path.to_path_buf(),
    message: format!("malformed output {:?}: {err}", stdout.trim()),
  })
}
