//! Runner configuration: the resolved settings record and the config-file
//! parser.
//!
//! The config file is UTF-8 text: `#` lines and blank lines are ignored;
//! lines starting with `-` are whitespace-tokenised and prepended to the
//! command-line arguments; everything else is `KEY = VALUE` for the
//! substitution table.

use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::error::FatalError;
use crate::plan::{SubstTable, RESERVED_KEYS};
use crate::shell::Shell;

/// The runner's resolved settings, threaded explicitly through the
/// orchestrator and copied per worker in parallel mode.
#[derive(Clone, Debug)]
pub struct Settings {
    pub verbose: bool,
    pub quiet: bool,
    /// Feature tags for REQUIRES/UNSUPPORTED gating; `check` is always
    /// present.
    pub features: Vec<String>,
    /// Per-step timeout in seconds; 0 disables.
    pub timeout_secs: u64,
    /// Root for `%t`/`%T` scratch allocation.
    pub scratch_root: String,
    /// Root for `%b`/`%B` binary artifacts.
    pub bin_root: String,
    pub jobs: usize,
    pub lit_compat: bool,
    pub shell: Shell,
    /// User substitution table (config file plus the `check` default).
    pub substs: SubstTable,
}

impl Settings {
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.iter().any(|f| f == name)
    }
}

/// Parse a config file into the substitution table and the argument
/// prelude. `-` lines are tokenised on whitespace only; a nested `-c` is
/// skipped together with its value.
pub fn parse_config_file(
    path: &str,
    subs: &mut SubstTable,
    config_args: &mut Vec<String>,
) -> Result<(), FatalError> {
    let file = File::open(path).map_err(|source| FatalError::OpenConfig {
        path: path.to_string(),
        source,
    })?;

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let lineno = idx + 1;
        let line = line.map_err(|source| FatalError::OpenConfig {
            path: path.to_string(),
            source,
        })?;
        let line = line.trim_end();
        let s = line.trim_start();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        if s.starts_with('-') {
            let mut toks = s.split_whitespace();
            while let Some(tok) = toks.next() {
                if tok == "-c" {
                    toks.next();
                    continue;
                }
                config_args.push(tok.to_string());
            }
            continue;
        }
        let Some((key, val)) = s.split_once('=') else {
            eprintln!("config {}:{}: missing '='", path, lineno);
            continue;
        };
        let key = key.trim();
        let val = val.trim_start();
        if RESERVED_KEYS.contains(&key) {
            eprintln!("config {}:{}: reserved key '{}' ignored", path, lineno, key);
            continue;
        }
        subs.insert(key.to_string(), val.to_string());
    }
    Ok(())
}

/// Fall back to the default when an option carries an empty value.
pub fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}
