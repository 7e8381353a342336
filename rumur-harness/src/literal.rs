//! Literal values shared by test directives and configuration probes.
//!
//! The grammar is closed: booleans, integers, quoted strings,
//! bracketed lists of strings and pattern literals. Anything else is rejected
//! instead of being evaluated.

use regex::Regex;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone)]
pub enum Literal {
  Bool(bool),
  Int(i64),
  Str(String),
  List(Vec<String>),
  Pattern(Regex),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
  pub message: String,
  pub offset: usize,
}

impl Literal {
  pub fn kind(&self) -> &'static str {
    match self {
      Literal::Bool(_) => "boolean",
      Literal::Int(_) => "integer",
      Literal::Str(_) => "string",
      Literal::List(_) => "list",
      Literal::Pattern(_) => "pattern",
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Literal::Bool(value) => Some(*value),
      _ => None,
    }
  }

  pub fn as_int(&self) -> Option<i64> {
    match self {
      Literal::Int(value) => Some(*value),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Literal::Str(value) => Some(value),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[String]> {
    match self {
      Literal::List(values) => Some(values),
      _ => None,
    }
  }

  pub fn as_pattern(&self) -> Option<&Regex> {
    match self {
      Literal::Pattern(re) => Some(re),
      _ => None,
    }
  }

  /// Rendering used when a value is exported into a child environment.
  /// Strings are passed bare; everything else uses literal syntax.
  pub fn env_value(&self) -> String {
    match self {
      Literal::Str(value) => value.clone(),
      other => other.to_string(),
    }
  }
}

impl PartialEq for Literal {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Literal::Bool(a), Literal::Bool(b)) => a == b,
      (Literal::Int(a), Literal::Int(b)) => a == b,
      (Literal::Str(a), Literal::Str(b)) => a == b,
      (Literal::List(a), Literal::List(b)) => a == b,
      (Literal::Pattern(a), Literal::Pattern(b)) => a.as_str() == b.as_str(),
      _ => false,
    }
  }
}

impl fmt::Display for Literal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Literal::Bool(true) => f.write_str("True"),
      Literal::Bool(false) => f.write_str("False"),
      Literal::Int(value) => write!(f, "{value}"),
      Literal::Str(value) => f.write_str(&quote(value)),
      Literal::List(values) => {
        f.write_str("[")?;
        for (idx, value) in values.iter().enumerate() {
          if idx > 0 {
            f.write_str(", ")?;
          }
          f.write_str(&quote(value))?;
        }
        f.write_str("]")
      }
      Literal::Pattern(re) => write!(f, "re.compile({})", quote(re.as_str())),
    }
  }
}

fn quote(value: &str) -> String {
  let mut out = String::with_capacity(value.len() + 2);
  out.push('\'');
  for c in value.chars() {
    match c {
      '\\' => out.push_str("\\\\"),
      '\'' => out.push_str("\\'"),
      '\n' => out.push_str("\\n"),
      '\t' => out.push_str("\\t"),
      '\r' => out.push_str("\\r"),
      c => out.push(c),
    }
  }
  out.push('\'');
  out
}

/// Parse a complete literal. Leading and trailing whitespace is allowed,
/// any other trailing input is an error.
pub fn parse_literal(src: &str) -> Result<Literal, LiteralError> {
  let mut parser = Parser { src, pos: 0 };
  let literal = parser.literal()?;
  parser.skip_ws();
  if parser.pos != src.len() {
    return Err(parser.error("unexpected trailing input"));
  }
  Ok(literal)
}

struct Parser<'a> {
  src: &'a str,
  pos: usize,
}

impl<'a> Parser<'a> {
  fn error(&self, message: impl Into<String>) -> LiteralError {
    LiteralError {
      message: message.into(),
      offset: self.pos,
    }
  }

  fn rest(&self) -> &'a str {
    &self.src[self.pos..]
  }

  fn peek(&self) -> Option<char> {
    self.rest().chars().next()
  }

  fn peek_second(&self) -> Option<char> {
    self.rest().chars().nth(1)
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += c.len_utf8();
    Some(c)
  }

  fn eat(&mut self, c: char) -> bool {
    if self.peek() == Some(c) {
      self.pos += c.len_utf8();
      true
    } else {
      false
    }
  }

  fn skip_ws(&mut self) {
    while matches!(self.peek(), Some(c) if c.is_whitespace()) {
      self.bump();
    }
  }

  fn literal(&mut self) -> Result<Literal, LiteralError> {
    self.skip_ws();
    match self.peek() {
      None => Err(self.error("expected a literal")),
      Some('[') => self.list(),
      Some('\'' | '"') => Ok(Literal::Str(self.string(false)?)),
      Some('/') => self.slash_pattern(),
      Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => self.integer(),
      Some(c) if c.is_alphabetic() || c == '_' => self.word(),
      Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
    }
  }

  fn word(&mut self) -> Result<Literal, LiteralError> {
    if self.peek() == Some('r') && matches!(self.peek_second(), Some('\'' | '"')) {
      self.bump();
      return Ok(Literal::Str(self.string(true)?));
    }

    let start = self.pos;
    while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_' || c == '.') {
      self.bump();
    }
    let word = &self.src[start..self.pos];
    match word {
      "True" | "true" => Ok(Literal::Bool(true)),
      "False" | "false" => Ok(Literal::Bool(false)),
      "re.compile" => self.compile_call(),
      other => Err(LiteralError {
        message: format!("unsupported expression `{other}`"),
        offset: start,
      }),
    }
  }

  fn compile_call(&mut self) -> Result<Literal, LiteralError> {
    self.skip_ws();
    if !self.eat('(') {
      return Err(self.error("expected '(' after re.compile"));
    }
    self.skip_ws();
    let start = self.pos;
    let pattern = match self.literal()? {
      Literal::Str(pattern) => pattern,
      other => {
        return Err(LiteralError {
          message: format!("re.compile expects a string, found {}", other.kind()),
          offset: start,
        })
      }
    };
    self.skip_ws();
    if !self.eat(')') {
      return Err(self.error("expected ')' to close re.compile"));
    }
    self.compile(&pattern, start)
  }

  fn slash_pattern(&mut self) -> Result<Literal, LiteralError> {
    let start = self.pos;
    self.bump();
    let mut pattern = String::new();
    loop {
      match self.bump() {
        None => return Err(self.error("unterminated pattern literal")),
        Some('/') => break,
        Some('\\') => match self.bump() {
          Some('/') => pattern.push('/'),
          Some(c) => {
            pattern.push('\\');
            pattern.push(c);
          }
          None => return Err(self.error("unterminated pattern literal")),
        },
        Some(c) => pattern.push(c),
      }
    }
    self.compile(&pattern, start)
  }

  fn compile(&self, pattern: &str, offset: usize) -> Result<Literal, LiteralError> {
    Regex::new(pattern)
      .map(Literal::Pattern)
      .map_err(|err| LiteralError {
        message: format!("invalid pattern: {err}"),
        offset,
      })
  }

  fn integer(&mut self) -> Result<Literal, LiteralError> {
    let start = self.pos;
    if matches!(self.peek(), Some('-' | '+')) {
      self.bump();
    }
    if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
      return Err(self.error("expected digits"));
    }
    // `_` may only separate two digits.
    loop {
      match (self.peek(), self.peek_second()) {
        (Some(c), _) if c.is_ascii_digit() => {}
        (Some('_'), Some(next)) if next.is_ascii_digit() => {}
        _ => break,
      }
      self.bump();
    }
    let raw: String = self.src[start..self.pos]
      .chars()
      .filter(|c| *c != '_')
      .collect();
    raw.parse::<i64>().map(Literal::Int).map_err(|err| LiteralError {
      message: format!("invalid integer: {err}"),
      offset: start,
    })
  }

  fn string(&mut self, raw: bool) -> Result<String, LiteralError> {
    let Some(quote) = self.bump() else {
      return Err(self.error("expected a string"));
    };
    let mut out = String::new();
    loop {
      let Some(c) = self.bump() else {
        return Err(self.error("unterminated string"));
      };
      if c == quote {
        return Ok(out);
      }
      if c != '\\' {
        out.push(c);
        continue;
      }
      let Some(escaped) = self.bump() else {
        return Err(self.error("unterminated string"));
      };
      if raw {
        out.push('\\');
        out.push(escaped);
        continue;
      }
      match escaped {
        'n' => out.push('\n'),
        't' => out.push('\t'),
        'r' => out.push('\r'),
        '0' => out.push('\0'),
        '\\' | '\'' | '"' => out.push(escaped),
        other => {
          out.push('\\');
          out.push(other);
        }
      }
    }
  }

  fn list(&mut self) -> Result<Literal, LiteralError> {
    self.bump();
    let mut items = Vec::new();
    self.skip_ws();
    if self.eat(']') {
      return Ok(Literal::List(items));
    }
    loop {
      self.skip_ws();
      let start = self.pos;
      match self.literal()? {
        Literal::Str(item) => items.push(item),
        other => {
          return Err(LiteralError {
            message: format!("list elements must be strings, found {}", other.kind()),
            offset: start,
          })
        }
      }
      self.skip_ws();
      if self.eat(',') {
        self.skip_ws();
        if self.eat(']') {
          break;
        }
        continue;
      }
      if self.eat(']') {
        break;
      }
      return Err(self.error("expected ',' or ']'"));
    }
    Ok(Literal::List(items))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_scalars() {
    assert_eq!(parse_literal("True").unwrap(), Literal::Bool(true));
    assert_eq!(parse_literal(" false ").unwrap(), Literal::Bool(false));
    assert_eq!(parse_literal("-3").unwrap(), Literal::Int(-3));
    assert_eq!(parse_literal("42").unwrap(), Literal::Int(42));
    assert_eq!(parse_literal("1_000").unwrap(), Literal::Int(1000));
    assert_eq!(
      parse_literal("'cc'").unwrap(),
      Literal::Str("cc".to_string())
    );
    assert_eq!(
      parse_literal(r#""it's""#).unwrap(),
      Literal::Str("it's".to_string())
    );
  }

  #[test]
  fn parses_string_lists() {
    let parsed = parse_literal("['--bound', '10', ]").unwrap();
    assert_eq!(
      parsed,
      Literal::List(vec!["--bound".to_string(), "10".to_string()])
    );
    assert_eq!(parse_literal("[]").unwrap(), Literal::List(Vec::new()));
  }

  #[test]
  fn raw_strings_keep_backslashes() {
    assert_eq!(
      parse_literal(r"r'\bput\b'").unwrap(),
      Literal::Str(r"\bput\b".to_string())
    );
    assert_eq!(
      parse_literal(r"'a\nb'").unwrap(),
      Literal::Str("a\nb".to_string())
    );
  }

  #[test]
  fn parses_pattern_forms() {
    let compiled = parse_literal(r"re.compile(r'\d+ states')").unwrap();
    assert!(compiled.as_pattern().unwrap().is_match("found 12 states"));

    let slashed = parse_literal(r"/a\/b/").unwrap();
    assert_eq!(slashed.as_pattern().unwrap().as_str(), "a/b");
  }

  #[test]
  fn rejects_everything_else() {
    for src in [
      "",
      "None",
      "__import__('os')",
      "1 + 1",
      "[1, 2]",
      "'unterminated",
      "re.compile('(')",
      "1.5",
      "'a' 'b'",
      "-_1",
      "1__0",
      "1_",
      "_1",
      "+",
    ] {
      assert!(parse_literal(src).is_err(), "{src:?} should be rejected");
    }
  }

  #[test]
  fn display_round_trips_through_parser() {
    let parsed = parse_literal(r#"['-std=c11', "it's"]"#).unwrap();
    let reparsed = parse_literal(&parsed.to_string()).unwrap();
    assert_eq!(parsed, reparsed);
    assert_eq!(Literal::Str("cc".to_string()).env_value(), "cc");
    assert_eq!(Literal::Bool(true).env_value(), "True");
  }
}
