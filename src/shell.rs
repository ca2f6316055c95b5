//! Shell collaborator.
//!
//! Selects the shell used for RUN steps (probing `set -o pipefail`
//! support) and executes commands with an optional timeout. The handoff
//! variables are attached per child so parallel workers never touch the
//! parent's environment.

use std::env;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

const DEFAULT_SHELL: &str = "/bin/sh";
const PIPEFAIL_PRELUDE: &str = "set -o pipefail 2>/dev/null || :; ";

/// The selected shell and whether it understands `set -o pipefail`.
#[derive(Clone, Debug)]
pub struct Shell {
    pub path: String,
    pub pipefail: bool,
}

impl Shell {
    /// Probe the environment once at startup. `$TIKL_SHELL` overrides the
    /// path; without it, `/bin/sh` is preferred and `/bin/bash` is used
    /// only when it alone supports pipefail. Lit-compat skips probing.
    pub fn detect(lit_compat: bool) -> Shell {
        if let Ok(forced) = env::var("TIKL_SHELL") {
            if !forced.is_empty() {
                let pipefail = !lit_compat && probe_pipefail(&forced);
                return Shell {
                    path: forced,
                    pipefail,
                };
            }
        }
        if lit_compat {
            return Shell {
                path: DEFAULT_SHELL.to_string(),
                pipefail: false,
            };
        }
        if probe_pipefail(DEFAULT_SHELL) {
            return Shell {
                path: DEFAULT_SHELL.to_string(),
                pipefail: true,
            };
        }
        if is_executable("/bin/bash") && probe_pipefail("/bin/bash") {
            return Shell {
                path: "/bin/bash".to_string(),
                pipefail: true,
            };
        }
        Shell {
            path: DEFAULT_SHELL.to_string(),
            pipefail: false,
        }
    }
}

/// Environment handed to each spawned step: the checker substitution blob
/// and the lit-compat switch.
#[derive(Clone, Debug)]
pub struct StepEnv {
    pub check_substs: Option<String>,
    pub lit_compat: bool,
}

impl StepEnv {
    fn apply(&self, cmd: &mut Command) {
        match (&self.check_substs, self.lit_compat) {
            (Some(blob), false) => {
                cmd.env("TIKL_CHECK_SUBSTS", blob);
            }
            _ => {
                cmd.env_remove("TIKL_CHECK_SUBSTS");
            }
        }
        if self.lit_compat {
            cmd.env("TIKL_LIT_COMPAT", "1");
        } else {
            cmd.env_remove("TIKL_LIT_COMPAT");
        }
    }
}

/// Outcome of one shell invocation.
#[derive(Clone, Copy, Debug)]
pub struct StepOutcome {
    pub exit_code: i32,
    pub timed_out: bool,
}

/// Run `cmd` through the shell. A non-lit-compat shell with pipefail
/// support gets the pipefail prelude so pipeline failures propagate
/// through the exit code. Timeout kills the child (SIGKILL) and reports
/// exit 124.
pub fn run_command(
    shell: &Shell,
    cmd: &str,
    env: &StepEnv,
    timeout_secs: u64,
    verbose: bool,
) -> StepOutcome {
    let script = if !env.lit_compat && shell.pipefail {
        format!("{}{}", PIPEFAIL_PRELUDE, cmd)
    } else {
        cmd.to_string()
    };
    if verbose {
        eprintln!("    $ {}", cmd);
    }

    let mut command = Command::new(&shell.path);
    command.arg("-c").arg(&script);
    env.apply(&mut command);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            eprintln!("{}: {}", shell.path, e);
            return StepOutcome {
                exit_code: 127,
                timed_out: false,
            };
        }
    };

    if timeout_secs == 0 {
        return match child.wait() {
            Ok(status) => StepOutcome {
                exit_code: map_exit_status(status),
                timed_out: false,
            },
            Err(e) => {
                eprintln!("wait: {}", e);
                StepOutcome {
                    exit_code: 127,
                    timed_out: false,
                }
            }
        };
    }

    match child.wait_timeout(Duration::from_secs(timeout_secs)) {
        Ok(Some(status)) => StepOutcome {
            exit_code: map_exit_status(status),
            timed_out: false,
        },
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            StepOutcome {
                exit_code: 124,
                timed_out: true,
            }
        }
        Err(e) => {
            eprintln!("wait: {}", e);
            StepOutcome {
                exit_code: 127,
                timed_out: false,
            }
        }
    }
}

fn map_exit_status(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    match status.signal() {
        Some(signo) => 128 + signo,
        None => 127,
    }
}

fn probe_pipefail(shell_path: &str) -> bool {
    Command::new(shell_path)
        .args(["-c", "set -o pipefail 2>/dev/null"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn is_executable(path: &str) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
