//! Substitution planner.
//!
//! Computes the per-test builtin table (`%s`, `%S`, `%b`, `%B`, `%t`,
//! `%T`), runs the user-config fixed-point pass, materialises RUN
//! commands, and builds the checker-handoff blob carried in
//! `TIKL_CHECK_SUBSTS`.

use std::env;
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::FatalError;
use crate::subst::{self, ExpandError};

/// Ordered user substitution table. Insertion order is preserved and a
/// duplicate key replaces the value in place.
pub type SubstTable = IndexMap<String, String>;

pub const DEFAULT_BIN_ROOT: &str = "bin";
pub const DEFAULT_SCRATCH_ROOT: &str = "/tmp";

/// Builtin keys reserved for the planner; user configuration may not
/// shadow them.
pub const RESERVED_KEYS: [&str; 6] = ["s", "S", "t", "T", "b", "B"];

/// Upper bound on config fixed-point iterations.
const MAX_CONFIG_PASSES: usize = 8;

/// The path-shaped builtins for one test file.
#[derive(Debug)]
pub struct TestPaths {
    /// `%s`: the test source, cwd-relative when possible.
    pub source: String,
    /// `%S`: directory of `%s`.
    pub source_dir: String,
    /// `%b`: binary artifact path under the bin root.
    pub bin: String,
    /// `%B`: directory of `%b`, created on demand.
    pub bin_dir: String,
}

impl TestPaths {
    /// Compute the four path builtins and make sure `%B` exists.
    pub fn compute(
        test_path: &str,
        test_path_abs: &Path,
        bin_root: &str,
    ) -> Result<Self, FatalError> {
        let source = pick_test_path(test_path, test_path_abs);
        let source_dir = textual_dirname(&source);
        let bin = map_source_to_bin(&source, bin_root);
        let bin_dir = textual_dirname(&bin);
        ensure_dir(&bin_dir)?;
        Ok(TestPaths {
            source,
            source_dir,
            bin,
            bin_dir,
        })
    }

    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "s" => Some(self.source.clone()),
            "S" => Some(self.source_dir.clone()),
            "b" => Some(self.bin.clone()),
            "B" => Some(self.bin_dir.clone()),
            _ => None,
        }
    }
}

/// `%s` selection: relative to the current directory when the absolute
/// path lies under it, otherwise the path as given with a leading `./`
/// stripped.
fn pick_test_path(test_path: &str, test_path_abs: &Path) -> String {
    if let Some(rel) = relativize_to_cwd(test_path_abs) {
        return rel;
    }
    skip_dot_slash(test_path).to_string()
}

fn relativize_to_cwd(abs: &Path) -> Option<String> {
    if !abs.is_absolute() {
        return None;
    }
    let cwd = env::current_dir().ok()?;
    let rel = abs.strip_prefix(&cwd).ok()?;
    let rel = rel.to_string_lossy();
    if rel.is_empty() {
        None
    } else {
        Some(rel.into_owned())
    }
}

fn skip_dot_slash(path: &str) -> &str {
    match path.strip_prefix("./") {
        Some(rest) if !rest.is_empty() => rest,
        _ => path,
    }
}

/// Everything before the last `/`, or `.` for separator-free paths.
fn textual_dirname(path: &str) -> String {
    match path.rfind('/') {
        Some(i) => path[..i].to_string(),
        None => ".".to_string(),
    }
}

/// Strip at the last `.` unless it is the first character.
fn strip_last_ext(path: &str) -> &str {
    match path.rfind('.') {
        Some(i) if i > 0 => &path[..i],
        _ => path,
    }
}

/// `%b`: the source path, extension stripped, re-rooted under `bin_root`.
fn map_source_to_bin(source: &str, bin_root: &str) -> String {
    let rel = skip_dot_slash(strip_last_ext(source));
    let root = if bin_root.is_empty() {
        DEFAULT_BIN_ROOT
    } else {
        bin_root
    };
    if root.ends_with('/') {
        format!("{}{}", root, rel)
    } else {
        format!("{}/{}", root, rel)
    }
}

/// Recursively create `path` (mode 0755). Empty and `.` are no-ops.
fn ensure_dir(path: &str) -> Result<(), FatalError> {
    if path.is_empty() || path == "." {
        return Ok(());
    }
    DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(path)
        .map_err(|source| FatalError::CreateDir {
            path: path.to_string(),
            source,
        })
}

/// Create a fresh scratch directory (`tikl.*`, mode 0700) under the
/// scratch root, falling back to `/tmp`. The directory is kept on disk so
/// test artefacts survive for inspection.
pub fn make_temp_dir(scratch_root: &str) -> Option<PathBuf> {
    for root in [scratch_root, DEFAULT_SCRATCH_ROOT] {
        let base = if root.is_empty() { "." } else { root };
        if let Ok(dir) = tempfile::Builder::new().prefix("tikl.").tempdir_in(base) {
            return Some(dir.keep());
        }
    }
    None
}

/// Reserve a uniquely-named `%t` file under the first candidate root that
/// accepts one. The file is created to claim the name and kept.
fn make_temp_file(temp_dir: Option<&Path>, scratch_root: &str) -> String {
    let mut candidates: Vec<&Path> = Vec::new();
    if let Some(dir) = temp_dir {
        candidates.push(dir);
    }
    let scratch = Path::new(if scratch_root.is_empty() {
        "."
    } else {
        scratch_root
    });
    candidates.push(scratch);
    candidates.push(Path::new(DEFAULT_SCRATCH_ROOT));

    for dir in candidates {
        if let Ok(file) = tempfile::Builder::new().prefix("out.").tempfile_in(dir) {
            if let Ok((_, path)) = file.keep() {
                return path.to_string_lossy().into_owned();
            }
        }
    }
    if let Ok(file) = tempfile::Builder::new()
        .prefix("tikl-out.")
        .tempfile_in(DEFAULT_SCRATCH_ROOT)
    {
        if let Ok((_, path)) = file.keep() {
            return path.to_string_lossy().into_owned();
        }
    }
    format!("{}/tikl-out.XXXXXX", DEFAULT_SCRATCH_ROOT)
}

/// Rewrite `input` against the user table until a fixed point is reached,
/// bounded by [`MAX_CONFIG_PASSES`]. Helpers stay disabled; user values
/// may reference other user keys but not call functions.
pub fn apply_config_substitutions(
    input: &str,
    subs: &SubstTable,
) -> Result<String, ExpandError> {
    let mut current = input.to_string();
    for _ in 0..MAX_CONFIG_PASSES {
        let next = subst::expand(&current, true, false, &|key| subs.get(key).cloned())?;
        if next == current {
            break;
        }
        current = next;
    }
    Ok(current)
}

/// Materialise one RUN command: user-config fixed point, then one pass
/// with helpers enabled against the builtin table. A fresh temp dir and
/// `%t` file are allocated per call.
pub fn perform_substitutions(
    cmd: &str,
    subs: &SubstTable,
    scratch_root: &str,
    bin_root: &str,
    test_path: &str,
    test_path_abs: &Path,
) -> Result<String, FatalError> {
    let paths = TestPaths::compute(test_path, test_path_abs, bin_root)?;

    let temp_dir = make_temp_dir(scratch_root);
    let temp_file = make_temp_file(temp_dir.as_deref(), scratch_root);
    let scratch_for_big_t = match &temp_dir {
        Some(dir) => dir.to_string_lossy().into_owned(),
        None if scratch_root.is_empty() => DEFAULT_SCRATCH_ROOT.to_string(),
        None => scratch_root.to_string(),
    };

    let cmd = apply_config_substitutions(cmd, subs)?;
    let expanded = subst::expand(&cmd, true, true, &|key| match key {
        "t" => Some(temp_file.clone()),
        "T" => Some(scratch_for_big_t.clone()),
        other => paths.lookup(other),
    })?;
    Ok(expanded)
}

/// Build the newline-separated `key=value` blob handed to the checker:
/// the path builtins first, then every user key with its value
/// pre-expanded against the user table and the path builtins.
pub fn build_check_substs_blob(
    subs: &SubstTable,
    bin_root: &str,
    test_path: &str,
    test_path_abs: &Path,
) -> Result<Option<String>, FatalError> {
    let paths = TestPaths::compute(test_path, test_path_abs, bin_root)?;

    let mut lines = vec![
        format!("s={}", paths.source),
        format!("S={}", paths.source_dir),
        format!("b={}", paths.bin),
        format!("B={}", paths.bin_dir),
    ];
    for (key, val) in subs {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        let passed = apply_config_substitutions(val, subs)?;
        let expanded = subst::expand(&passed, true, true, &|k| paths.lookup(k))?;
        lines.push(format!("{}={}", key, expanded));
    }

    if lines.is_empty() {
        return Ok(None);
    }
    Ok(Some(lines.join("\n")))
}
