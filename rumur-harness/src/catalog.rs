use crate::config::is_executable;
use crate::directives::Directives;
use crate::pipeline::Tool;
use crate::HarnessError;
use crate::Result;
use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;
use regex::Regex;
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

pub const MODEL_EXTENSION: &str = "m";

/// A test input with its leading directives already parsed.
#[derive(Debug)]
pub struct TestInput {
  pub path: PathBuf,
  pub source: String,
  pub directives: Directives,
}

impl TestInput {
  pub fn load(path: &Path) -> Result<TestInput> {
    let bytes = std::fs::read(path)?;
    let source = String::from_utf8_lossy(&bytes).into_owned();
    TestInput::from_source(path.to_path_buf(), source)
  }

  pub fn from_source(path: PathBuf, source: String) -> Result<TestInput> {
    let directives = Directives::parse(&path, &source)?;
    Ok(TestInput {
      path,
      source,
      directives,
    })
  }

  /// A freestanding program: nothing is read from it.
  pub fn executable(path: PathBuf) -> TestInput {
    TestInput {
      path,
      source: String::new(),
      directives: Directives::default(),
    }
  }
}

/// One (input, tool) pair, ready to be run.
#[derive(Debug, Clone)]
pub struct Job {
  pub suite: String,
  pub id: String,
  pub tool: Tool,
  pub input: Arc<TestInput>,
}

impl Job {
  pub fn key(&self) -> String {
    format!("{}.{}", self.suite, self.id)
  }
}

#[derive(Debug, Clone)]
pub struct Suite {
  pub name: String,
  pub jobs: Vec<Job>,
  ids: HashSet<String>,
}

impl Suite {
  fn new(name: String) -> Self {
    Self {
      name,
      jobs: Vec::new(),
      ids: HashSet::new(),
    }
  }

  fn register(&mut self, job: Job) -> Result<()> {
    if !self.ids.insert(job.id.clone()) {
      return Err(HarnessError::DuplicateTest {
        suite: self.name.clone(),
        id: job.id,
        path: job.input.path.clone(),
      });
    }
    self.jobs.push(job);
    Ok(())
  }
}

/// Every registered job, grouped into suites in a fixed order.
#[derive(Debug, Clone)]
pub struct Catalog {
  suites: Vec<Suite>,
}

impl Catalog {
  pub fn new() -> Self {
    let suites = std::iter::once(Tool::Executable)
      .chain(Tool::model_tools())
      .map(|tool| Suite::new(tool.suite_name()))
      .collect();
    Self { suites }
  }

  /// Register every test input found directly inside `root`.
  ///
  /// Executable files become `executable` jobs; `.m` files become one job per
  /// model tool. A file can be both. Any directive error or name collision
  /// aborts construction.
  pub fn discover(root: &Path) -> Result<Catalog> {
    if !root.is_dir() {
      return Err(HarnessError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("test directory {} not found", root.display()),
      )));
    }

    let mut catalog = Catalog::new();
    for entry in WalkDir::new(root)
      .min_depth(1)
      .max_depth(1)
      .sort_by_file_name()
    {
      let path = entry.map_err(io::Error::from)?.into_path();
      if path.is_dir() {
        continue;
      }

      let id = make_name(&path);
      if is_executable(&path) {
        let input = Arc::new(TestInput::executable(path.clone()));
        catalog.register(Tool::Executable, &id, input)?;
      }

      if path.extension().and_then(|ext| ext.to_str()) != Some(MODEL_EXTENSION) {
        continue;
      }
      let input = Arc::new(TestInput::load(&path)?);
      for tool in Tool::model_tools() {
        catalog.register(tool, &id, Arc::clone(&input))?;
      }
    }

    debug!(root = %root.display(), jobs = catalog.len(), "catalog built");
    Ok(catalog)
  }

  pub fn register(&mut self, tool: Tool, id: &str, input: Arc<TestInput>) -> Result<()> {
    let suite_name = tool.suite_name();
    let idx = match self.suites.iter().position(|s| s.name == suite_name) {
      Some(idx) => idx,
      None => {
        self.suites.push(Suite::new(suite_name.clone()));
        self.suites.len() - 1
      }
    };
    self.suites[idx].register(Job {
      suite: suite_name,
      id: id.to_string(),
      tool,
      input,
    })
  }

  pub fn suites(&self) -> &[Suite] {
    &self.suites
  }

  pub fn len(&self) -> usize {
    self.suites.iter().map(|s| s.jobs.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Jobs whose `suite.id` key passes `filter`, in registration order.
  pub fn jobs<'a>(&'a self, filter: &'a Filter) -> impl Iterator<Item = &'a Job> + 'a {
    self
      .suites
      .iter()
      .flat_map(|suite| suite.jobs.iter())
      .filter(move |job| filter.matches(&job.key()))
  }
}

impl Default for Catalog {
  fn default() -> Self {
    Self::new()
  }
}

/// Mangle a file name into a test identifier: `test_` followed by the name
/// with every character outside `[A-Za-z0-9]` replaced by `_`.
pub fn make_name(path: &Path) -> String {
  let name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let safe: String = name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
    .collect();
  format!("test_{safe}")
}

#[derive(Debug, Clone)]
pub enum Filter {
  All,
  Glob(GlobSet),
  Regex(Regex),
}

/// Characters with meaning in a regex but none in a glob. A pattern using any
/// of them is compiled as a regex; anything else is tried as a glob first.
const REGEX_ONLY: &[char] = &['^', '$', '(', ')', '|', '+', '\\'];

pub fn build_filter(pattern: Option<&str>) -> Result<Filter> {
  match pattern {
    None => Ok(Filter::All),
    Some(raw) => {
      if raw.contains(REGEX_ONLY) {
        let regex =
          Regex::new(raw).map_err(|err| HarnessError::InvalidFilter(err.to_string()))?;
        return Ok(Filter::Regex(regex));
      }

      if let Ok(glob) = Glob::new(raw) {
        let mut builder = GlobSetBuilder::new();
        builder.add(glob);
        let set = builder
          .build()
          .map_err(|err| HarnessError::InvalidFilter(err.to_string()))?;
        return Ok(Filter::Glob(set));
      }

      let regex = Regex::new(raw).map_err(|err| HarnessError::InvalidFilter(err.to_string()))?;
      Ok(Filter::Regex(regex))
    }
  }
}

impl Filter {
  pub fn matches(&self, key: &str) -> bool {
    match self {
      Filter::All => true,
      Filter::Glob(set) => set.is_match(key),
      Filter::Regex(re) => re.is_match(key),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::tempdir;

  #[test]
  fn names_are_mangled() {
    assert_eq!(make_name(Path::new("/x/a-b.m")), "test_a_b_m");
    assert_eq!(make_name(Path::new("a_b.m")), "test_a_b_m");
    assert_eq!(make_name(Path::new("caf\u{e9}.m")), "test_caf__m");
  }

  #[test]
  fn every_model_gets_one_job_per_tool() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("b.m"), "var x: boolean;\n").unwrap();
    fs::write(temp.path().join("a.m"), "-- rumur_exit_code: 1\n").unwrap();
    fs::write(temp.path().join("notes.txt"), "").unwrap();
    fs::create_dir(temp.path().join("config")).unwrap();

    let catalog = Catalog::discover(temp.path()).unwrap();
    let per_tool = Tool::model_tools().len();
    assert_eq!(catalog.len(), 2 * per_tool);

    let ids: Vec<&str> = catalog.suites()[1].jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, ["test_a_m", "test_b_m"]);
    assert_eq!(catalog.suites()[1].jobs[0].input.directives.rumur_exit_code, 1);
  }

  #[test]
  fn colliding_names_abort_construction() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("a-b.m"), "").unwrap();
    fs::write(temp.path().join("a_b.m"), "").unwrap();

    let err = Catalog::discover(temp.path()).unwrap_err();
    match err {
      HarnessError::DuplicateTest { id, .. } => assert_eq!(id, "test_a_b_m"),
      other => panic!("unexpected error {other:?}"),
    }
  }

  #[test]
  fn bad_directive_aborts_construction() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("bad.m"), "-- rumur_flags: [--x]\n").unwrap();
    let err = Catalog::discover(temp.path()).unwrap_err();
    assert!(matches!(err, HarnessError::Directive { line: 1, .. }));
  }

  #[cfg(unix)]
  #[test]
  fn executables_are_registered_separately() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().unwrap();
    let script = temp.path().join("check-something.sh");
    fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let catalog = Catalog::discover(temp.path()).unwrap();
    assert_eq!(catalog.len(), 1);
    let job = &catalog.suites()[0].jobs[0];
    assert_eq!(job.suite, "executable");
    assert_eq!(job.id, "test_check_something_sh");
  }

  #[test]
  fn filters_select_by_suite_and_id() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("a.m"), "").unwrap();
    let catalog = Catalog::discover(temp.path()).unwrap();

    let filter = build_filter(Some("murphi2*.test_a_m")).unwrap();
    let keys: Vec<String> = catalog.jobs(&filter).map(Job::key).collect();
    assert_eq!(
      keys,
      [
        "murphi2c.test_a_m",
        "murphi2c_header.test_a_m",
        "murphi2uclid.test_a_m",
        "murphi2xml.test_a_m"
      ]
    );
    assert_eq!(catalog.jobs(&Filter::All).count(), catalog.len());
  }

  #[test]
  fn regex_syntax_selects_regex_filter() {
    let filter = build_filter(Some(r"^murphi2(c|xml)\.test_a_m$")).unwrap();
    assert!(matches!(filter, Filter::Regex(_)));
    assert!(filter.matches("murphi2c.test_a_m"));
    assert!(filter.matches("murphi2xml.test_a_m"));
    assert!(!filter.matches("murphi2c_header.test_a_m"));

    let filter = build_filter(Some("checker_*_xml.*")).unwrap();
    assert!(matches!(filter, Filter::Glob(_)));
    assert!(filter.matches("checker_single_threaded_xml.test_a_m"));

    assert!(matches!(
      build_filter(Some("murphi2c(")),
      Err(HarnessError::InvalidFilter(_))
    ));
  }
}
