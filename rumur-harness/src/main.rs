use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use rumur_harness::build_filter;
use rumur_harness::run_catalog;
use rumur_harness::Catalog;
use rumur_harness::Config;
use rumur_harness::SystemRunner;
use rumur_harness::Toolchain;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Integration test harness for the rumur toolchain")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Probe the toolchain and run every selected test.
  Run(RunArgs),
  /// Print the `suite.id` of every selected test without running it.
  List(CommonArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
  /// Directory holding the test inputs
  #[arg(long, default_value = ".")]
  root: PathBuf,

  /// Glob or regex over `suite.id`
  #[arg(long)]
  filter: Option<String>,

  /// Enable tracing output from the harness
  #[arg(long)]
  trace: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
  #[command(flatten)]
  common: CommonArgs,

  /// Directory of configuration probes (default: <root>/config)
  #[arg(long, value_name = "DIR")]
  config_dir: Option<PathBuf>,

  /// Emit the JSON report instead of the human summary
  #[arg(long)]
  json: bool,

  #[command(flatten)]
  tools: ToolArgs,
}

/// Overrides for the programs and schemas under test.
#[derive(Args, Debug)]
struct ToolArgs {
  #[arg(long, value_name = "PATH")]
  rumur: Option<PathBuf>,
  #[arg(long, value_name = "PATH")]
  murphi2c: Option<PathBuf>,
  #[arg(long, value_name = "PATH")]
  murphi2uclid: Option<PathBuf>,
  #[arg(long, value_name = "PATH")]
  murphi2xml: Option<PathBuf>,
  #[arg(long, value_name = "PATH")]
  valgrind: Option<PathBuf>,
  #[arg(long, value_name = "PATH")]
  xmllint: Option<PathBuf>,
  #[arg(long, value_name = "PATH")]
  uclid: Option<PathBuf>,
  /// RELAX NG schema for the checker's machine-readable output
  #[arg(long, value_name = "PATH")]
  verifier_schema: Option<PathBuf>,
  /// RELAX NG schema for murphi2xml output
  #[arg(long, value_name = "PATH")]
  murphi2xml_schema: Option<PathBuf>,
}

impl ToolArgs {
  fn toolchain(self, root: &Path) -> Toolchain {
    let mut tools = Toolchain::for_root(root);
    let overrides = [
      (&mut tools.rumur, self.rumur),
      (&mut tools.murphi2c, self.murphi2c),
      (&mut tools.murphi2uclid, self.murphi2uclid),
      (&mut tools.murphi2xml, self.murphi2xml),
      (&mut tools.valgrind, self.valgrind),
      (&mut tools.xmllint, self.xmllint),
      (&mut tools.uclid, self.uclid),
      (&mut tools.verifier_schema, self.verifier_schema),
      (&mut tools.murphi2xml_schema, self.murphi2xml_schema),
    ];
    for (slot, value) in overrides {
      if let Some(value) = value {
        *slot = value;
      }
    }
    tools
  }
}

fn main() -> ExitCode {
  match try_main() {
    Ok(code) => code,
    Err(err) => {
      eprintln!("error: {err:#}");
      ExitCode::FAILURE
    }
  }
}

fn try_main() -> Result<ExitCode> {
  let cli = Cli::parse();
  match cli.command {
    Command::Run(args) => run(args),
    Command::List(args) => list(args),
  }
}

fn list(args: CommonArgs) -> Result<ExitCode> {
  init_tracing(args.trace);
  let filter = build_filter(args.filter.as_deref())?;
  let catalog = Catalog::discover(&args.root)
    .with_context(|| format!("failed to load tests from {}", args.root.display()))?;
  for job in catalog.jobs(&filter) {
    println!("{}", job.key());
  }
  Ok(ExitCode::SUCCESS)
}

fn run(args: RunArgs) -> Result<ExitCode> {
  let RunArgs {
    common,
    config_dir,
    json,
    tools,
  } = args;
  init_tracing(common.trace);

  let filter = build_filter(common.filter.as_deref())?;
  let catalog = Catalog::discover(&common.root)
    .with_context(|| format!("failed to load tests from {}", common.root.display()))?;

  let probe_dir = config_dir.unwrap_or_else(|| common.root.join("config"));
  let config = Config::discover(&probe_dir, tools.toolchain(&common.root))
    .with_context(|| format!("failed to probe configuration in {}", probe_dir.display()))?;

  let report = run_catalog(&catalog, &config, &SystemRunner, &filter)?;

  let mut stdout = io::stdout().lock();
  if json {
    report.write_json(&mut stdout)?;
  } else {
    report.write_human(&mut stdout)?;
  }

  Ok(if report.summary.has_failures() {
    ExitCode::FAILURE
  } else {
    ExitCode::SUCCESS
  })
}

fn init_tracing(enable: bool) {
  if !enable {
    return;
  }

  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = fmt()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr);
  if let Err(err) = builder.try_init() {
    eprintln!("failed to install tracing subscriber: {err}");
  }
}
