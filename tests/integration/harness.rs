//! Shared test infrastructure.
//!
//! Each test gets a `Sandbox`: a temp directory that acts as the working
//! directory for the runner, so `%s` relativization, `bin/` creation, and
//! scratch allocation all stay inside it. The cargo target directory is
//! prepended to `PATH` so shell commands can invoke `tikl-check` by name.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;

pub struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Sandbox {
            dir: tempfile::tempdir().expect("failed to create sandbox dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file (creating parent directories) and return its
    /// sandbox-relative name for passing on the command line.
    pub fn write(&self, name: &str, contents: &str) -> String {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            if parent != self.dir.path() {
                fs::create_dir_all(parent).unwrap();
            }
        }
        fs::write(&path, contents).unwrap();
        name.to_string()
    }

    /// A runner command rooted in this sandbox.
    pub fn tikl(&self) -> Command {
        let mut cmd = super::tikl_cmd();
        self.prepare(&mut cmd);
        cmd
    }

    /// A checker command rooted in this sandbox.
    pub fn tikl_check(&self) -> Command {
        let mut cmd = super::tikl_check_cmd();
        self.prepare(&mut cmd);
        cmd
    }

    fn prepare(&self, cmd: &mut Command) {
        cmd.current_dir(self.dir.path());
        cmd.env("PATH", path_with_bin_dir());
        cmd.env_remove("TIKL_SHELL");
        cmd.env_remove("TIKL_LIT_COMPAT");
        cmd.env_remove("TIKL_CHECK_SUBSTS");
    }
}

/// PATH with the directory holding the freshly built binaries in front.
fn path_with_bin_dir() -> OsString {
    let check_bin = PathBuf::from(env!("CARGO_BIN_EXE_tikl-check"));
    let bin_dir = check_bin.parent().expect("binary has a parent dir");
    let mut paths = vec![bin_dir.to_path_buf()];
    if let Some(existing) = env::var_os("PATH") {
        paths.extend(env::split_paths(&existing));
    }
    env::join_paths(paths).expect("failed to join PATH")
}
