//! Run the shipped testdata corpus through the real driver.

use std::path::Path;

use predicates::prelude::*;

use super::harness::Sandbox;
use super::{some_line_has, stderr_of};

/// Copy a testdata file into the sandbox and return its relative name.
fn import(sb: &Sandbox, name: &str) -> String {
    let src = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(name);
    std::fs::copy(&src, sb.path().join(name)).unwrap();
    name.to_string()
}

#[test]
fn hello_pipeline_passes() {
    let sb = Sandbox::new();
    let test = import(&sb, "hello.c");
    sb.tikl()
        .arg(&test)
        .assert()
        .success()
        .stderr(predicate::str::contains("[  OK ] hello.c"));
}

#[test]
fn multi_step_artifact_passes() {
    let sb = Sandbox::new();
    let test = import(&sb, "steps.c");
    sb.tikl()
        .arg(&test)
        .assert()
        .success()
        .stderr(predicate::str::contains("[  OK ] steps.c"));
    let scratch = std::fs::read_to_string(sb.path().join("scratch.txt")).unwrap();
    assert_eq!(scratch, "alpha\nbeta\n");
}

#[test]
fn gated_test_skips_without_feature() {
    let sb = Sandbox::new();
    let test = import(&sb, "features.c");
    sb.tikl()
        .arg(&test)
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "[ SKIP] features.c (missing feature: demo)",
        ));
}

#[test]
fn gated_test_runs_with_feature() {
    let sb = Sandbox::new();
    let test = import(&sb, "features.c");
    sb.tikl()
        .args(["-D", "demo", test.as_str()])
        .assert()
        .success()
        .stderr(predicate::str::contains("[  OK ] features.c"));
}

#[test]
fn expected_failure_is_soft_pass() {
    let sb = Sandbox::new();
    let test = import(&sb, "expected_failure.c");
    sb.tikl()
        .arg(&test)
        .assert()
        .success()
        .stderr(predicate::str::contains("[XFAIL] expected_failure.c"));
}

#[test]
fn whole_corpus_passes_in_one_invocation() {
    let sb = Sandbox::new();
    let files = [
        import(&sb, "hello.c"),
        import(&sb, "steps.c"),
        import(&sb, "features.c"),
        import(&sb, "expected_failure.c"),
    ];
    let args: Vec<&str> = files.iter().map(String::as_str).collect();
    let assert = sb.tikl().args(&args).assert().success();
    let stderr = stderr_of(&assert);
    assert!(some_line_has(&stderr, "[  OK ]", "hello.c"));
    assert!(some_line_has(&stderr, "[ SKIP]", "features.c"));
    assert!(some_line_has(&stderr, "[XFAIL]", "expected_failure.c"));
}
