//! Test orchestrator.
//!
//! For each test file: scan directives, apply feature gating, materialise
//! and execute every RUN step in order with timeout/retry/XFAIL
//! accounting, and report a status line per test. With `-j N` test files
//! run on a bounded worker pool, each worker owning a private scratch
//! root; the first non-zero exit code wins and stops new work.

use std::fs::{self, File};
use std::io::BufReader;
use std::sync::atomic::{AtomicI32, Ordering};

use rayon::prelude::*;

use crate::config::Settings;
use crate::plan;
use crate::scanner::TestScript;
use crate::shell::{self, StepEnv};

/// Run every test file, serially or on a worker pool, and return the
/// process exit code (first non-zero step code wins).
pub fn run_files(files: &[String], settings: &Settings) -> i32 {
    if settings.jobs <= 1 || files.len() <= 1 {
        for file in files {
            let rc = run_test_file(file, settings);
            if rc != 0 {
                return rc;
            }
        }
        return 0;
    }
    run_files_parallel(files, settings)
}

fn run_files_parallel(files: &[String], settings: &Settings) -> i32 {
    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(settings.jobs)
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("tikl: thread pool: {}", e);
            return 2;
        }
    };

    let first_failure = AtomicI32::new(0);
    pool.install(|| {
        files.par_iter().for_each(|file| {
            // Best-effort cancellation: tasks not yet started are skipped
            // once a failure is recorded; running tasks finish.
            if first_failure.load(Ordering::SeqCst) != 0 {
                return;
            }
            let rc = run_in_worker(file, settings);
            if rc != 0 {
                let _ = first_failure.compare_exchange(0, rc, Ordering::SeqCst, Ordering::SeqCst);
            }
        });
    });
    first_failure.load(Ordering::SeqCst)
}

/// One parallel task: give the test a private scratch root, then run it.
fn run_in_worker(file: &str, settings: &Settings) -> i32 {
    let Some(worker_scratch) = plan::make_temp_dir(&settings.scratch_root) else {
        eprintln!("tikl: cannot create worker scratch directory");
        return 127;
    };
    let mut worker = settings.clone();
    worker.scratch_root = worker_scratch.to_string_lossy().into_owned();
    run_test_file(file, &worker)
}

/// Run a single test file and return its exit code. Setup failures
/// (unreadable file, unresolvable path, bad placeholder) report 2;
/// step failures report the step's code; XFAIL demotes failures to 0.
pub fn run_test_file(path: &str, settings: &Settings) -> i32 {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("open {}: {}", path, e);
            return 2;
        }
    };
    let abs = match fs::canonicalize(path) {
        Ok(abs) => abs,
        Err(e) => {
            eprintln!("realpath {}: {}", path, e);
            return 2;
        }
    };

    let step_env = if settings.lit_compat {
        StepEnv {
            check_substs: None,
            lit_compat: true,
        }
    } else {
        let blob = match plan::build_check_substs_blob(
            &settings.substs,
            &settings.bin_root,
            path,
            &abs,
        ) {
            Ok(blob) => blob,
            Err(e) => {
                eprintln!("tikl: {}", e);
                return 2;
            }
        };
        StepEnv {
            check_substs: blob,
            lit_compat: false,
        }
    };

    let script = match TestScript::parse(BufReader::new(file), path) {
        Ok(script) => script,
        Err(e) => {
            eprintln!("read {}: {}", path, e);
            return 2;
        }
    };

    if !settings.quiet {
        eprintln!("[ RUN ] {}", path);
    }

    for feature in &script.requires {
        if !settings.has_feature(feature) {
            if !settings.quiet {
                eprintln!("[ SKIP] {} (missing feature: {})", path, feature);
            }
            return 0;
        }
    }
    for feature in &script.unsupported {
        if settings.has_feature(feature) {
            if !settings.quiet {
                eprintln!("[ SKIP] {} (unsupported on feature: {})", path, feature);
            }
            return 0;
        }
    }

    let reason = script.xfail_reason.as_deref().unwrap_or("");

    if script.runs.is_empty() {
        if !settings.quiet {
            if script.xfail {
                let sep = if reason.is_empty() { "" } else { "; " };
                eprintln!("[XFAIL] {} (no RUN directives{}{})", path, sep, reason);
            } else {
                eprintln!("[FAIL] {} (no RUN directives)", path);
            }
        }
        return if script.xfail { 0 } else { 1 };
    }

    let attempts = script.allow_retries.map_or(1, |r| r as u64 + 1).max(1);
    let mut rc = 0;
    let mut xfail_hit = false;

    for (step, run) in script.runs.iter().enumerate() {
        let step_no = step + 1;
        let cmd = match plan::perform_substitutions(
            run,
            &settings.substs,
            &settings.scratch_root,
            &settings.bin_root,
            path,
            &abs,
        ) {
            Ok(cmd) => cmd,
            Err(e) => {
                eprintln!("tikl: {}", e);
                return 2;
            }
        };

        let mut success = false;
        let mut exit_code = 0;
        let mut timed_out = false;
        let mut used_attempts = 0;
        for attempt in 0..attempts {
            let outcome = shell::run_command(
                &settings.shell,
                &cmd,
                &step_env,
                settings.timeout_secs,
                settings.verbose,
            );
            used_attempts = attempt + 1;
            exit_code = outcome.exit_code;
            timed_out = outcome.timed_out;
            if exit_code == 0 {
                success = true;
                break;
            }
            if attempt + 1 < attempts && !settings.quiet {
                if timed_out {
                    eprintln!(
                        "[RETRY] {} (step {} timed out, retry {}/{})",
                        path,
                        step_no,
                        attempt + 2,
                        attempts
                    );
                } else {
                    eprintln!(
                        "[RETRY] {} (step {} exit {}, retry {}/{})",
                        path,
                        step_no,
                        exit_code,
                        attempt + 2,
                        attempts
                    );
                }
            }
        }

        if !success {
            if !settings.quiet {
                if script.xfail {
                    let sep = if reason.is_empty() { "" } else { "; " };
                    if timed_out {
                        eprintln!("[XFAIL] {} (step {} timed out{}{})", path, step_no, sep, reason);
                    } else {
                        eprintln!(
                            "[XFAIL] {} (step {} exit {}{}{})",
                            path, step_no, exit_code, sep, reason
                        );
                    }
                } else {
                    let attempt_note = if used_attempts > 1 { " after retries" } else { "" };
                    if timed_out {
                        eprintln!(
                            "[TIME] {} (step {} exceeded {} s{})",
                            path, step_no, settings.timeout_secs, attempt_note
                        );
                    } else {
                        eprintln!(
                            "[FAIL] {} (step {} exit {}{})",
                            path, step_no, exit_code, attempt_note
                        );
                    }
                }
            }
            if script.xfail {
                xfail_hit = true;
                rc = 0;
            } else {
                rc = if exit_code != 0 { exit_code } else { 1 };
            }
            break;
        }
    }

    if rc == 0 {
        if script.xfail {
            if !xfail_hit {
                if !settings.quiet {
                    let sep = if reason.is_empty() { "" } else { ": " };
                    eprintln!("[XPASS] {}{}{}", path, sep, reason);
                }
                rc = 1;
            }
        } else if !settings.quiet {
            eprintln!("[  OK ] {}", path);
        }
    }
    rc
}
