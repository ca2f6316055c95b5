mod config_file;
mod demo_suite;
mod harness;
mod substitutions;

use assert_cmd::Command;

pub fn tikl_cmd() -> Command {
    assert_cmd::cargo_bin_cmd!("tikl")
}

pub fn tikl_check_cmd() -> Command {
    assert_cmd::cargo_bin_cmd!("tikl-check")
}

/// Check that at least one line contains both `prefix` and `needle`.
pub fn some_line_has(output: &str, prefix: &str, needle: &str) -> bool {
    output
        .lines()
        .any(|l| l.contains(prefix) && l.contains(needle))
}

/// Check that no line matching `prefix` also contains `needle`.
#[allow(dead_code)]
pub fn no_line_has(output: &str, prefix: &str, needle: &str) -> bool {
    !some_line_has(output, prefix, needle)
}

/// Extract stderr (the runner's status stream) from an Assert.
pub fn stderr_of(a: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(a.get_output().stderr.clone()).unwrap()
}

/// Extract stdout from an Assert.
#[allow(dead_code)]
pub fn stdout_of(a: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(a.get_output().stdout.clone()).unwrap()
}
