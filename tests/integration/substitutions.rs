//! Placeholder expansion in RUN commands: builtin paths, user keys,
//! helper functions, and literal percent handling.

use predicates::prelude::*;

use super::harness::Sandbox;

#[test]
fn source_placeholders_expand_to_relative_paths() {
    let sb = Sandbox::new();
    let test = sb.write(
        "sub/dir/paths.c",
        "// RUN: echo s=%s S=%S > out.txt\n",
    );
    sb.tikl().arg(&test).assert().success();
    let out = std::fs::read_to_string(sb.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "s=sub/dir/paths.c S=sub/dir");
}

#[test]
fn bin_placeholders_reroot_and_create_directories() {
    let sb = Sandbox::new();
    let test = sb.write("pkg/unit.c", "// RUN: echo b=%b B=%B > out.txt\n");
    sb.tikl().arg(&test).assert().success();
    let out = std::fs::read_to_string(sb.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "b=bin/pkg/unit B=bin/pkg");
    assert!(sb.path().join("bin/pkg").is_dir());
}

#[test]
fn bin_root_flag_overrides_default() {
    let sb = Sandbox::new();
    let test = sb.write("unit.c", "// RUN: echo %b > out.txt\n");
    sb.tikl().args(["-b", "build", test.as_str()]).assert().success();
    let out = std::fs::read_to_string(sb.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "build/unit");
    assert!(sb.path().join("build").is_dir());
}

#[test]
fn temp_placeholders_point_into_scratch() {
    let sb = Sandbox::new();
    std::fs::create_dir(sb.path().join("scratch")).unwrap();
    let test = sb.write("tmp.c", "// RUN: test -f %t && test -d %T\n");
    sb.tikl().args(["-T", "scratch", test.as_str()]).assert().success();
}

#[test]
fn temp_file_is_writable_by_steps() {
    let sb = Sandbox::new();
    let test = sb.write("twrite.c", "// RUN: echo data > %t && test -s %t\n");
    sb.tikl().arg(&test).assert().success();
}

#[test]
fn double_percent_is_a_literal_percent() {
    let sb = Sandbox::new();
    let test = sb.write("pct.c", "// RUN: echo 100%%done > out.txt\n");
    sb.tikl().arg(&test).assert().success();
    let out = std::fs::read_to_string(sb.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "100%done");
}

#[test]
fn unknown_key_is_preserved_verbatim() {
    let sb = Sandbox::new();
    let test = sb.write("unk.c", "// RUN: echo %nosuchkey > out.txt\n");
    sb.tikl().arg(&test).assert().success();
    let out = std::fs::read_to_string(sb.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "%nosuchkey");
}

#[test]
fn basename_helper_in_run_line() {
    let sb = Sandbox::new();
    let test = sb.write(
        "help.c",
        "// RUN: echo %(basename /tmp/x/foo.c) %(basename /tmp/x/foo.c .c) > out.txt\n",
    );
    sb.tikl().arg(&test).assert().success();
    let out = std::fs::read_to_string(sb.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "foo.c foo");
}

#[test]
fn dirname_helper_in_run_line() {
    let sb = Sandbox::new();
    let test = sb.write("dir.c", "// RUN: echo %(dirname /a/b/c.txt) > out.txt\n");
    sb.tikl().arg(&test).assert().success();
    let out = std::fs::read_to_string(sb.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "/a/b");
}

#[test]
fn realpath_helper_resolves_against_filesystem() {
    let sb = Sandbox::new();
    let test = sb.write("rp.c", "// RUN: test -d %(realpath .)\n");
    sb.tikl().arg(&test).assert().success();
}

#[test]
fn helper_argument_may_reference_builtins() {
    let sb = Sandbox::new();
    let test = sb.write("nested.c", "// RUN: echo %(basename %s) > out.txt\n");
    sb.tikl().arg(&test).assert().success();
    let out = std::fs::read_to_string(sb.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "nested.c");
}

#[test]
fn unterminated_helper_call_is_fatal() {
    let sb = Sandbox::new();
    let test = sb.write("bad.c", "// RUN: echo %(basename foo\n");
    sb.tikl()
        .arg(&test)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unterminated %("));
}

#[test]
fn unknown_helper_function_is_fatal() {
    let sb = Sandbox::new();
    let test = sb.write("bad.c", "// RUN: echo %(frobnicate x)\n");
    sb.tikl()
        .arg(&test)
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "unknown placeholder function: frobnicate",
        ));
}

#[test]
fn pipefail_disabled_in_lit_compat_mode() {
    let sb = Sandbox::new();
    // Under plain sh semantics the pipeline's exit code is cat's.
    let test = sb.write("pipe.c", "// RUN: false | cat\n");
    sb.tikl().args(["-L", test.as_str()]).assert().success();
}
