use crate::config::Config;
use crate::directives::Directives;
use serde::Deserialize;
use serde::Serialize;
use std::ffi::OsString;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
  Text,
  MachineReadable,
}

/// One point in the checker's build/run axis space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
  pub debug: bool,
  pub optimised: bool,
  pub multithreaded: bool,
  pub format: OutputFormat,
}

const fn variant(debug: bool, optimised: bool, multithreaded: bool, xml: bool) -> Variant {
  Variant {
    debug,
    optimised,
    multithreaded,
    format: if xml {
      OutputFormat::MachineReadable
    } else {
      OutputFormat::Text
    },
  }
}

/// Every checker variant that gets registered. Debug builds are never paired
/// with machine-readable output.
pub const CHECKER_VARIANTS: [Variant; 12] = [
  variant(false, false, false, false),
  variant(true, false, false, false),
  variant(false, true, false, false),
  variant(true, true, false, false),
  variant(false, false, true, false),
  variant(true, false, true, false),
  variant(false, true, true, false),
  variant(true, true, true, false),
  variant(false, false, false, true),
  variant(false, true, false, true),
  variant(false, false, true, true),
  variant(false, true, true, true),
];

impl Variant {
  pub fn is_xml(&self) -> bool {
    self.format == OutputFormat::MachineReadable
  }

  /// Suite name, e.g. `checker_debug_optimised_multithreaded`.
  pub fn suite_name(&self) -> String {
    let mut name = String::from("checker");
    if self.debug {
      name.push_str("_debug");
    }
    if self.optimised {
      name.push_str("_optimised");
    }
    if self.multithreaded {
      name.push_str("_multithreaded");
    } else {
      name.push_str("_single_threaded");
    }
    if self.is_xml() {
      name.push_str("_xml");
    }
    name
  }

  /// Arguments for the generator, excluding the program itself.
  ///
  /// `extra_flags` come last so a test input can override anything computed
  /// here.
  pub fn generator_args(
    &self,
    input: &Path,
    output: &Path,
    cpus: usize,
    extra_flags: &[String],
  ) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
      "--output".into(),
      output.as_os_str().to_owned(),
      input.as_os_str().to_owned(),
    ];
    if self.debug {
      args.push("--debug".into());
    }
    if self.is_xml() {
      args.push("--output-format".into());
      args.push("machine-readable".into());
    }
    // On a single core the generator would pick one thread; force two so the
    // multithreaded code path still runs.
    if self.multithreaded && cpus == 1 {
      args.push("--threads".into());
      args.push("2".into());
    } else if !self.multithreaded {
      args.push("--threads".into());
      args.push("1".into());
    }
    args.extend(extra_flags.iter().map(OsString::from));
    args
  }

  /// Compiler flags for the generated checker, unless a test input replaces
  /// them wholesale with `c_flags`.
  pub fn compile_flags(&self, config: &Config, directives: &Directives) -> Vec<String> {
    if let Some(flags) = &directives.c_flags {
      return flags.clone();
    }
    let mut flags = config.c_flags().to_vec();
    if self.optimised {
      flags.push("-O3".to_string());
    }
    flags
  }
}

/// Link flags for a compiled checker, unless replaced with `ld_flags`.
pub fn link_flags(config: &Config, directives: &Directives) -> Vec<String> {
  if let Some(flags) = &directives.ld_flags {
    return flags.clone();
  }
  let mut flags = vec!["-lpthread".to_string()];
  if config.needs_libatomic() {
    flags.push("-latomic".to_string());
  }
  flags
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Toolchain;
  use crate::literal::Literal;
  use std::collections::BTreeMap;
  use std::collections::HashSet;

  fn strings(args: &[OsString]) -> Vec<String> {
    args
      .iter()
      .map(|a| a.to_string_lossy().into_owned())
      .collect()
  }

  fn config(libatomic: bool) -> Config {
    let mut facts = BTreeMap::new();
    facts.insert("C_FLAGS".to_string(), Literal::List(vec!["-std=c11".into()]));
    facts.insert("NEEDS_LIBATOMIC".to_string(), Literal::Bool(libatomic));
    Config::new(facts, Toolchain::default(), 8).unwrap()
  }

  #[test]
  fn registered_variants_are_unique_and_never_debug_xml() {
    let names: HashSet<String> = CHECKER_VARIANTS.iter().map(Variant::suite_name).collect();
    assert_eq!(names.len(), CHECKER_VARIANTS.len());
    assert!(CHECKER_VARIANTS.iter().all(|v| !(v.debug && v.is_xml())));
    assert_eq!(CHECKER_VARIANTS.iter().filter(|v| v.is_xml()).count(), 4);
  }

  #[test]
  fn suite_names_spell_out_axes() {
    assert_eq!(CHECKER_VARIANTS[0].suite_name(), "checker_single_threaded");
    assert_eq!(
      CHECKER_VARIANTS[7].suite_name(),
      "checker_debug_optimised_multithreaded"
    );
    assert_eq!(
      CHECKER_VARIANTS[9].suite_name(),
      "checker_optimised_single_threaded_xml"
    );
  }

  #[test]
  fn single_threaded_pins_one_thread() {
    let args = CHECKER_VARIANTS[1].generator_args(Path::new("m.m"), Path::new("m.c"), 8, &[]);
    assert_eq!(
      strings(&args),
      ["--output", "m.c", "m.m", "--debug", "--threads", "1"]
    );
  }

  #[test]
  fn multithreaded_on_one_cpu_forces_two_threads() {
    let mt = variant(false, false, true, false);
    let args = mt.generator_args(Path::new("m.m"), Path::new("m.c"), 1, &[]);
    assert_eq!(strings(&args), ["--output", "m.c", "m.m", "--threads", "2"]);

    let args = mt.generator_args(Path::new("m.m"), Path::new("m.c"), 4, &[]);
    assert_eq!(strings(&args), ["--output", "m.c", "m.m"]);
  }

  #[test]
  fn xml_and_extra_flags_are_appended_last() {
    let xml = variant(false, false, true, true);
    let extra = vec!["--threads".to_string(), "4".to_string()];
    let args = xml.generator_args(Path::new("m.m"), Path::new("m.c"), 2, &extra);
    assert_eq!(
      strings(&args),
      [
        "--output",
        "m.c",
        "m.m",
        "--output-format",
        "machine-readable",
        "--threads",
        "4"
      ]
    );
  }

  #[test]
  fn compile_and_link_flags_follow_config_and_overrides() {
    let optimised = variant(false, true, false, false);
    let defaults = Directives::default();
    assert_eq!(
      optimised.compile_flags(&config(false), &defaults),
      ["-std=c11", "-O3"]
    );
    assert_eq!(link_flags(&config(false), &defaults), ["-lpthread"]);
    assert_eq!(link_flags(&config(true), &defaults), ["-lpthread", "-latomic"]);

    let overridden = Directives {
      c_flags: Some(vec!["-std=gnu11".to_string()]),
      ld_flags: Some(Vec::new()),
      ..Directives::default()
    };
    assert_eq!(
      optimised.compile_flags(&config(true), &overridden),
      ["-std=gnu11"]
    );
    assert!(link_flags(&config(true), &overridden).is_empty());
  }
}
