use crate::literal::parse_literal;
use crate::literal::Literal;
use crate::HarnessError;
use crate::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;

/// A single `-- key: value` line from the head of a test input.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
  pub key: String,
  pub value: Literal,
  /// 1-based line number within the input.
  pub line: usize,
}

/// Split a line into `(key, rest)` if it has the shape
/// `<ws> -- <ws> <identifier> <ws> : <rest>`.
fn split_directive_line(raw_line: &str) -> Option<(&str, &str)> {
  let content = raw_line.trim_start().strip_prefix("--")?.trim_start();

  let mut chars = content.char_indices();
  let (_, first) = chars.next()?;
  if !(first.is_ascii_alphabetic() || first == '_') {
    return None;
  }
  let end = chars
    .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
    .map(|(idx, _)| idx)
    .unwrap_or(content.len());

  let key = &content[..end];
  let rest = content[end..].trim_start().strip_prefix(':')?;
  Some((key, rest))
}

/// Collect the leading directive block of `text`.
///
/// Scanning stops permanently at the first line that does not have the
/// directive shape, including a blank line. A line with the right shape but
/// an unparsable value is an error naming `path` and the line.
pub fn parse_directives(path: &Path, text: &str) -> Result<Vec<Directive>> {
  let mut directives = Vec::new();
  for (idx, raw_line) in text.lines().enumerate() {
    let Some((key, rest)) = split_directive_line(raw_line) else {
      break;
    };
    let value = parse_literal(rest.trim()).map_err(|err| HarnessError::Directive {
      path: path.to_path_buf(),
      line: idx + 1,
      message: format!("{key}: {err}"),
    })?;
    directives.push(Directive {
      key: key.to_string(),
      value,
      line: idx + 1,
    });
  }
  Ok(directives)
}

/// Typed expectations for one test input, with defaults applied.
#[derive(Debug, Clone)]
pub struct Directives {
  pub rumur_flags: Vec<String>,
  pub rumur_exit_code: i32,
  pub c_flags: Option<Vec<String>>,
  pub ld_flags: Option<Vec<String>>,
  pub c_exit_code: i32,
  pub checker_exit_code: i32,
  pub checker_output: Option<Regex>,
  pub skip_reason: Option<String>,
  /// Keys this harness does not interpret.
  pub extra: BTreeMap<String, Literal>,
}

impl Default for Directives {
  fn default() -> Self {
    Self {
      rumur_flags: Vec::new(),
      rumur_exit_code: 0,
      c_flags: None,
      ld_flags: None,
      c_exit_code: 0,
      checker_exit_code: 0,
      checker_output: None,
      skip_reason: None,
      extra: BTreeMap::new(),
    }
  }
}

impl Directives {
  pub fn parse(path: &Path, text: &str) -> Result<Directives> {
    let entries = parse_directives(path, text)?;
    Directives::from_entries(path, &entries)
  }

  pub fn from_entries(path: &Path, entries: &[Directive]) -> Result<Directives> {
    let mut out = Directives::default();
    for entry in entries {
      let typed = TypedEntry {
        path,
        directive: entry,
      };
      match entry.key.as_str() {
        "rumur_flags" => out.rumur_flags = typed.list()?,
        "rumur_exit_code" => out.rumur_exit_code = typed.exit_code()?,
        "c_flags" => out.c_flags = Some(typed.list()?),
        "ld_flags" => out.ld_flags = Some(typed.list()?),
        "c_exit_code" => out.c_exit_code = typed.exit_code()?,
        "checker_exit_code" => out.checker_exit_code = typed.exit_code()?,
        "checker_output" => out.checker_output = Some(typed.pattern()?),
        "skip_reason" => out.skip_reason = Some(typed.string()?),
        other => {
          debug!(path = %path.display(), key = other, "ignoring unrecognized directive");
          out.extra.insert(other.to_string(), entry.value.clone());
        }
      }
    }
    Ok(out)
  }
}

struct TypedEntry<'a> {
  path: &'a Path,
  directive: &'a Directive,
}

impl TypedEntry<'_> {
  fn mismatch(&self, expected: &str) -> HarnessError {
    HarnessError::Directive {
      path: PathBuf::from(self.path),
      line: self.directive.line,
      message: format!(
        "{} expects {expected}, found {}",
        self.directive.key,
        self.directive.value.kind()
      ),
    }
  }

  fn list(&self) -> Result<Vec<String>> {
    self
      .directive
      .value
      .as_list()
      .map(|items| items.to_vec())
      .ok_or_else(|| self.mismatch("a list of strings"))
  }

  fn string(&self) -> Result<String> {
    self
      .directive
      .value
      .as_str()
      .map(str::to_string)
      .ok_or_else(|| self.mismatch("a string"))
  }

  fn pattern(&self) -> Result<Regex> {
    self
      .directive
      .value
      .as_pattern()
      .cloned()
      .ok_or_else(|| self.mismatch("a pattern"))
  }

  fn exit_code(&self) -> Result<i32> {
    let value = self
      .directive
      .value
      .as_int()
      .ok_or_else(|| self.mismatch("an integer"))?;
    i32::try_from(value).map_err(|_| self.mismatch("an exit status"))
  }
}
