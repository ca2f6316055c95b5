//! Config file parsing: substitution keys, argument prelude lines, and
//! diagnostics.

use predicates::prelude::*;

use super::harness::Sandbox;
use super::stderr_of;

#[test]
fn config_keys_substitute_in_run_lines() {
    let sb = Sandbox::new();
    sb.write("tikl.cfg", "echo_cmd = echo from-config\n");
    let test = sb.write("t.c", "// RUN: %echo_cmd > out.txt\n");
    sb.tikl().args(["-c", "tikl.cfg", test.as_str()]).assert().success();
    let out = std::fs::read_to_string(sb.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "from-config");
}

#[test]
fn config_keys_resolve_recursively() {
    let sb = Sandbox::new();
    sb.write(
        "tikl.cfg",
        "# greeting pieces\ngreet = hello %name\nname = world\n",
    );
    let test = sb.write("t.c", "// RUN: echo %greet > out.txt\n");
    sb.tikl().args(["-c", "tikl.cfg", test.as_str()]).assert().success();
    let out = std::fs::read_to_string(sb.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "hello world");
}

#[test]
fn later_config_keys_override_earlier() {
    let sb = Sandbox::new();
    sb.write("tikl.cfg", "cc = first\ncc = second\n");
    let test = sb.write("t.c", "// RUN: echo %cc > out.txt\n");
    sb.tikl().args(["-c", "tikl.cfg", test.as_str()]).assert().success();
    let out = std::fs::read_to_string(sb.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "second");
}

#[test]
fn dash_lines_prepend_arguments() {
    let sb = Sandbox::new();
    sb.write("tikl.cfg", "-q\n");
    let test = sb.write("t.c", "// RUN: true\n");
    let assert = sb
        .tikl()
        .args(["-c", "tikl.cfg", test.as_str()])
        .assert()
        .success();
    let stderr = stderr_of(&assert);
    assert!(
        !stderr.contains("[ RUN ]"),
        "config -q should silence status lines, got:\n{}",
        stderr
    );
}

#[test]
fn user_arguments_win_over_config_arguments() {
    let sb = Sandbox::new();
    sb.write("tikl.cfg", "-q\n");
    let test = sb.write("t.c", "// RUN: true\n");
    // -v on the command line overrides the config's -q.
    sb.tikl()
        .args(["-c", "tikl.cfg", "-v", test.as_str()])
        .assert()
        .success()
        .stderr(predicate::str::contains("[  OK ] t.c"));
}

#[test]
fn config_features_gate_tests() {
    let sb = Sandbox::new();
    sb.write("tikl.cfg", "-D fast\n");
    let test = sb.write("t.c", "// REQUIRES: fast\n// RUN: true\n");
    sb.tikl()
        .args(["-c", "tikl.cfg", test.as_str()])
        .assert()
        .success()
        .stderr(predicate::str::contains("[  OK ] t.c"));
}

#[test]
fn nested_config_reference_is_ignored() {
    let sb = Sandbox::new();
    sb.write("tikl.cfg", "-c other.cfg\nkey = val\n");
    let test = sb.write("t.c", "// RUN: echo %key > out.txt\n");
    sb.tikl().args(["-c", "tikl.cfg", test.as_str()]).assert().success();
    let out = std::fs::read_to_string(sb.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "val");
}

#[test]
fn missing_equals_is_diagnosed_and_skipped() {
    let sb = Sandbox::new();
    sb.write("tikl.cfg", "just some words\nok = yes\n");
    let test = sb.write("t.c", "// RUN: test %ok = yes\n");
    sb.tikl()
        .args(["-c", "tikl.cfg", test.as_str()])
        .assert()
        .success()
        .stderr(predicate::str::contains("missing '='"));
}

#[test]
fn reserved_keys_cannot_be_shadowed() {
    let sb = Sandbox::new();
    sb.write("tikl.cfg", "s = hijacked\n");
    let test = sb.write("t.c", "// RUN: test %s = t.c\n");
    sb.tikl()
        .args(["-c", "tikl.cfg", test.as_str()])
        .assert()
        .success()
        .stderr(predicate::str::contains("reserved key 's' ignored"));
}

#[test]
fn unreadable_config_is_fatal() {
    let sb = Sandbox::new();
    let test = sb.write("t.c", "// RUN: true\n");
    sb.tikl()
        .args(["-c", "no-such.cfg", test.as_str()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot open config no-such.cfg"));
}
