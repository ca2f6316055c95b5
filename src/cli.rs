//! Argument surfaces for the `tikl` and `tikl-check` binaries.
//!
//! The runner merges config-file argument lines before the user's own
//! arguments: `-c FILE` is pre-scanned from the raw argv, the config's
//! `-` lines are tokenised and prepended, and the merged vector is parsed
//! as usual (so user flags override config flags).

use std::env;
use std::num::NonZeroUsize;

use clap::Parser;

use crate::config::{self, Settings};
use crate::error::FatalError;
use crate::plan::{SubstTable, DEFAULT_BIN_ROOT, DEFAULT_SCRATCH_ROOT};
use crate::shell::Shell;

#[derive(Parser, Debug)]
#[command(
    name = "tikl",
    version,
    about = "Run lit-style test files: execute embedded RUN: directives with placeholder expansion"
)]
pub struct RunnerCli {
    /// Echo each shell command before running it
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Suppress per-test status lines
    #[arg(short = 'q')]
    pub quiet: bool,

    /// Substitution config file (lines: KEY = VALUE)
    #[arg(short = 'c', value_name = "FILE")]
    pub config: Option<String>,

    /// Enable a feature for REQUIRES/UNSUPPORTED gating
    #[arg(short = 'D', value_name = "FEATURE")]
    pub features: Vec<String>,

    /// Timeout for each RUN command in seconds (0 disables)
    #[arg(short = 't', value_name = "SECONDS", default_value_t = 0)]
    pub timeout: u64,

    /// Scratch directory root for %t/%T
    #[arg(short = 'T', value_name = "DIR", default_value = "/tmp")]
    pub scratch: String,

    /// Base directory used when expanding %b/%B
    #[arg(short = 'b', value_name = "DIR", default_value = "bin")]
    pub bin_root: String,

    /// Run up to JOBS test files in parallel
    #[arg(short = 'j', value_name = "JOBS")]
    pub jobs: Option<NonZeroUsize>,

    /// Force lit-compatible behaviour (disable tikl extras)
    #[arg(short = 'L')]
    pub lit_compat: bool,

    /// Test files to run
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<String>,
}

/// Parse the runner's arguments with the config-file prelude applied.
/// Returns the parsed CLI and the substitution table (config keys plus
/// the `check` default).
pub fn parse_runner_args() -> Result<(RunnerCli, SubstTable), FatalError> {
    let argv: Vec<String> = env::args().collect();

    // Pre-scan for -c so config args can join the parse below.
    let mut config_path = None;
    for i in 1..argv.len() {
        if argv[i] == "-c" && i + 1 < argv.len() {
            config_path = Some(argv[i + 1].clone());
            break;
        }
    }

    let mut substs = SubstTable::new();
    substs.insert("check".to_string(), "tikl-check %s".to_string());

    let mut config_args = Vec::new();
    if let Some(path) = &config_path {
        config::parse_config_file(path, &mut substs, &mut config_args)?;
    }

    let mut merged = Vec::with_capacity(argv.len() + config_args.len());
    merged.push(argv[0].clone());
    merged.extend(config_args);
    let mut i = 1;
    while i < argv.len() {
        if argv[i] == "-c" {
            i += 2;
            continue;
        }
        merged.push(argv[i].clone());
        i += 1;
    }

    let cli = RunnerCli::parse_from(&merged);
    Ok((cli, substs))
}

/// Resolve the parsed CLI into the orchestrator's settings record plus
/// the test-file list.
pub fn resolve(cli: RunnerCli, substs: SubstTable) -> (Settings, Vec<String>) {
    // -q and -v together mean verbose.
    let quiet = cli.quiet && !cli.verbose;

    let mut features = vec!["check".to_string()];
    features.extend(cli.features);

    let lit_compat = cli.lit_compat;
    let settings = Settings {
        verbose: cli.verbose,
        quiet,
        features,
        timeout_secs: cli.timeout,
        scratch_root: config::or_default(&cli.scratch, DEFAULT_SCRATCH_ROOT),
        bin_root: config::or_default(&cli.bin_root, DEFAULT_BIN_ROOT),
        jobs: cli.jobs.map_or(1, NonZeroUsize::get),
        lit_compat,
        shell: Shell::detect(lit_compat),
        substs,
    };
    (settings, cli.files)
}

fn parse_prefix(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("empty --check-prefix value".to_string());
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(format!("invalid prefix: {}", name));
    }
    Ok(name.to_string())
}

#[derive(Parser, Debug)]
#[command(
    name = "tikl-check",
    version,
    about = "Verify captured output against CHECK directives from a test file"
)]
pub struct CheckerCli {
    /// Check prefix to scan for (repeatable; default CHECK)
    #[arg(
        short = 'p',
        long = "check-prefix",
        value_name = "NAME",
        value_parser = parse_prefix
    )]
    pub prefixes: Vec<String>,

    /// Dump the captured output when any directive fails
    #[arg(short = 'x', long = "print-output-on-fail")]
    pub print_output_on_fail: bool,

    /// Test file containing the CHECK directives
    #[arg(value_name = "TESTFILE")]
    pub test_file: String,
}
