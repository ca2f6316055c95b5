//! Pattern checker.
//!
//! Parses `CHECK*` directives from a test file, expands their pattern
//! text through the placeholder engine (seeded from `TIKL_CHECK_SUBSTS`),
//! compiles each pattern to a regex, and verifies the captured output read
//! from stdin. Every directive failure is reported; the exit code is 1 if
//! any directive failed.

use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};

use regex::Regex;

use crate::error::FatalError;
use crate::plan::SubstTable;
use crate::subst;

/// Checker invocation options, assembled from the CLI.
#[derive(Debug)]
pub struct Options {
    pub prefixes: Vec<String>,
    pub print_output_on_fail: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CheckKind {
    Forward,
    Next,
    Same,
    Empty,
    Not,
    Count,
}

/// Per-prefix positional cursor: the 1-based line of the last match and
/// whether any match happened yet.
#[derive(Debug)]
struct PrefixCursor {
    last_line: usize,
    have_last: bool,
}

/// One compiled directive. `regex` is absent only for EMPTY.
#[derive(Debug)]
struct Directive {
    kind: CheckKind,
    prefix: usize,
    pattern: String,
    regex: Option<Regex>,
    count_target: u64,
    line_no: usize,
    label: String,
}

/// Run the checker against `test_file`, reading captured output from
/// stdin. Returns the process exit code (0 all satisfied, 1 violations).
pub fn run(test_file: &str, opts: &Options) -> Result<i32, FatalError> {
    let prefixes = if opts.prefixes.is_empty() {
        vec!["CHECK".to_string()]
    } else {
        opts.prefixes.clone()
    };
    let lit_compat = lit_compat_from_env();
    let substs = load_substs_from_env();

    let file = File::open(test_file).map_err(|source| FatalError::OpenTest {
        path: test_file.to_string(),
        source,
    })?;

    let mut status = false;
    let directives = parse_directives(
        BufReader::new(file),
        &prefixes,
        lit_compat,
        &substs,
        &mut status,
    )
    .map_err(|source| FatalError::OpenTest {
        path: test_file.to_string(),
        source,
    })?;

    let output = read_output(io::stdin().lock());

    let mut cursors: Vec<PrefixCursor> = prefixes
        .iter()
        .map(|_| PrefixCursor {
            last_line: 0,
            have_last: false,
        })
        .collect();
    run_directives(test_file, &directives, &output, &mut cursors, &mut status);

    if opts.print_output_on_fail && status {
        dump_program_output(&output);
    }
    Ok(if status { 1 } else { 0 })
}

/// `TIKL_LIT_COMPAT` set, non-empty, and not `"0"`.
fn lit_compat_from_env() -> bool {
    match env::var("TIKL_LIT_COMPAT") {
        Ok(val) => !val.is_empty() && val != "0",
        Err(_) => false,
    }
}

/// Seed the substitution table from the runner's handoff blob.
fn load_substs_from_env() -> SubstTable {
    let mut table = SubstTable::new();
    let Ok(blob) = env::var("TIKL_CHECK_SUBSTS") else {
        return table;
    };
    for line in blob.split('\n') {
        if line.is_empty() {
            continue;
        }
        let Some((key, val)) = line.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        table.insert(key.to_string(), val.to_string());
    }
    table
}

/// Directive suffixes in recognition order; the first prefix+suffix found
/// anywhere in a line wins and ends the scan of that line.
const SUFFIXES: [(&str, CheckKind); 6] = [
    ("-NEXT:", CheckKind::Next),
    ("-SAME:", CheckKind::Same),
    ("-EMPTY:", CheckKind::Empty),
    ("-COUNT:", CheckKind::Count),
    ("-NOT:", CheckKind::Not),
    (":", CheckKind::Forward),
];

fn suffix_label(suffix: &str) -> &str {
    suffix.trim_end_matches(':')
}

fn match_directive<'a>(line: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    let needle = format!("{}{}", prefix, suffix);
    let pos = line.find(&needle)?;
    Some(&line[pos + needle.len()..])
}

fn parse_directives<R: BufRead>(
    reader: R,
    prefixes: &[String],
    lit_compat: bool,
    substs: &SubstTable,
    status: &mut bool,
) -> io::Result<Vec<Directive>> {
    let mut directives = Vec::new();
    let mut line_no = 0usize;

    for line in reader.lines() {
        let line = line?;
        line_no += 1;
        let line = line.trim_end();

        'prefixes: for (pi, prefix) in prefixes.iter().enumerate() {
            for (suffix, kind) in SUFFIXES {
                let Some(rest) = match_directive(line, prefix, suffix) else {
                    continue;
                };
                parse_one(
                    &mut directives,
                    kind,
                    pi,
                    prefix,
                    suffix,
                    rest,
                    lit_compat,
                    substs,
                    line_no,
                    status,
                );
                break 'prefixes;
            }
        }
    }
    Ok(directives)
}

#[allow(clippy::too_many_arguments)]
fn parse_one(
    directives: &mut Vec<Directive>,
    kind: CheckKind,
    prefix_idx: usize,
    prefix: &str,
    suffix: &str,
    rest: &str,
    lit_compat: bool,
    substs: &SubstTable,
    line_no: usize,
    status: &mut bool,
) {
    let label = format!("{}{}", prefix, suffix_label(suffix));

    if kind == CheckKind::Empty {
        directives.push(Directive {
            kind,
            prefix: prefix_idx,
            pattern: String::new(),
            regex: None,
            count_target: 0,
            line_no,
            label,
        });
        return;
    }

    let mut count_target = 0u64;
    let mut pattern_src = rest.trim_start();
    if kind == CheckKind::Count {
        let content = pattern_src;
        let digits_end = content
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(content.len());
        let parsed = content[..digits_end].parse::<u64>();
        match parsed {
            Ok(count) if digits_end > 0 => count_target = count,
            _ => {
                eprintln!("tikl-check: invalid {}-COUNT directive: {}", prefix, content);
                *status = true;
                return;
            }
        }
        pattern_src = content[digits_end..].trim_start();
    }

    let Some(pattern) = expand_pattern(pattern_src, lit_compat, substs, status) else {
        return;
    };

    let Some(regex_src) = build_regex_from_pattern(&pattern, lit_compat) else {
        eprintln!("tikl-check: unterminated {{{{ in pattern: {}", pattern);
        *status = true;
        return;
    };
    let regex = match Regex::new(&regex_src) {
        Ok(regex) => regex,
        Err(e) => {
            eprintln!("tikl-check: regex error in pattern '{}': {}", pattern, e);
            *status = true;
            return;
        }
    };

    directives.push(Directive {
        kind,
        prefix: prefix_idx,
        pattern,
        regex: Some(regex),
        count_target,
        line_no,
        label,
    });
}

/// Expand a pattern through the placeholder engine. A prior failure
/// short-circuits further expansion; in lit-compat mode the pattern is
/// used verbatim and never short-circuits.
fn expand_pattern(
    pattern: &str,
    lit_compat: bool,
    substs: &SubstTable,
    status: &mut bool,
) -> Option<String> {
    if *status && !lit_compat {
        return None;
    }
    match subst::expand(pattern, !lit_compat, !lit_compat, &|key| {
        substs.get(key).cloned()
    }) {
        Ok(expanded) => Some(expanded),
        Err(e) => {
            eprintln!("tikl-check: {}", e);
            *status = true;
            None
        }
    }
}

/// Regex metacharacters escaped in literal pattern regions.
fn is_meta(c: char) -> bool {
    matches!(
        c,
        ']' | '[' | '.' | '^' | '$' | '\\' | '*' | '/' | '+' | '?' | '{' | '}' | '(' | ')' | '|'
    )
}

/// Append a literal pattern segment, escaping regex metacharacters. A
/// backslash may pass one metacharacter through verbatim; before any
/// other character it is dropped.
fn append_literal_segment(out: &mut String, segment: &str, escape_literals: bool) {
    if !escape_literals {
        out.push_str(segment);
        return;
    }
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                if is_meta(next) {
                    out.push('\\');
                }
                out.push(next);
                continue;
            }
        }
        if is_meta(c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Position of the first unescaped `}}` in `s`.
fn find_block_close(s: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = s[from..].find("}}").map(|i| i + from) {
        if pos > 0 && s.as_bytes()[pos - 1] == b'\\' {
            from = pos + 1;
            continue;
        }
        return Some(pos);
    }
    None
}

/// Translate pattern text to a regex: `{{...}}` windows are inserted
/// verbatim, everything else is escaped (unless lit-compat). `None` means
/// an unterminated `{{`.
fn build_regex_from_pattern(pattern: &str, lit_compat: bool) -> Option<String> {
    let escape_literals = !lit_compat;
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    loop {
        let Some(open) = rest.find("{{") else {
            append_literal_segment(&mut out, rest, escape_literals);
            return Some(out);
        };
        append_literal_segment(&mut out, &rest[..open], escape_literals);
        let inner = &rest[open + 2..];
        let close = find_block_close(inner)?;
        out.push_str(&inner[..close]);
        rest = &inner[close + 2..];
    }
}

/// Capture stdin as raw bytes and split into lines (trailing newline
/// stripped). Output is not assumed to be UTF-8; invalid sequences are
/// replaced rather than truncating the capture.
fn read_output<R: Read>(mut reader: R) -> Vec<String> {
    let mut buf = Vec::new();
    if reader.read_to_end(&mut buf).is_err() {
        return Vec::new();
    }
    if buf.is_empty() {
        return Vec::new();
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    buf.split(|&b| b == b'\n')
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect()
}

fn report_failure(test_file: &str, dir: &Directive, extra: &str) {
    eprintln!(
        "tikl-check: failed {}:{}: {}: {} ({})",
        test_file, dir.line_no, dir.label, dir.pattern, extra
    );
}

fn dump_program_output(lines: &[String]) {
    eprintln!("tikl-check: program output:");
    for line in lines {
        eprintln!("{}", line);
    }
}

fn regex_matches(dir: &Directive, line: &str) -> bool {
    dir.regex.as_ref().is_some_and(|re| re.is_match(line))
}

fn run_directives(
    test_file: &str,
    directives: &[Directive],
    lines: &[String],
    cursors: &mut [PrefixCursor],
    status: &mut bool,
) {
    for dir in directives {
        match dir.kind {
            CheckKind::Forward => check_forward(test_file, dir, lines, cursors, status),
            CheckKind::Next => check_next(test_file, dir, lines, cursors, status),
            CheckKind::Same => check_same(test_file, dir, lines, cursors, status),
            CheckKind::Empty => check_empty(test_file, dir, lines, cursors, status),
            CheckKind::Not => check_not(test_file, dir, lines, status),
            CheckKind::Count => check_count(test_file, dir, lines, status),
        }
    }
}

/// First line beyond the cursor matching the pattern; cursor advances to
/// the matched line.
fn check_forward(
    test_file: &str,
    dir: &Directive,
    lines: &[String],
    cursors: &mut [PrefixCursor],
    status: &mut bool,
) {
    let cursor = &mut cursors[dir.prefix];
    let start = cursor.last_line;
    for (i, line) in lines.iter().enumerate() {
        let nr = i + 1;
        if nr <= start {
            continue;
        }
        if regex_matches(dir, line) {
            cursor.last_line = nr;
            cursor.have_last = true;
            return;
        }
    }
    report_failure(test_file, dir, "pattern not found in remaining output");
    *status = true;
}

/// Exactly the line after the cursor must match.
fn check_next(
    test_file: &str,
    dir: &Directive,
    lines: &[String],
    cursors: &mut [PrefixCursor],
    status: &mut bool,
) {
    let cursor = &mut cursors[dir.prefix];
    if !cursor.have_last {
        report_failure(test_file, dir, "requires prior match");
        *status = true;
        return;
    }
    let expected = cursor.last_line + 1;
    if expected > lines.len() {
        report_failure(test_file, dir, "not enough output lines");
        *status = true;
        return;
    }
    if !regex_matches(dir, &lines[expected - 1]) {
        report_failure(test_file, dir, "next line mismatch");
        *status = true;
        return;
    }
    cursor.last_line = expected;
    cursor.have_last = true;
}

/// The cursor's own line must match again; the cursor does not move.
fn check_same(
    test_file: &str,
    dir: &Directive,
    lines: &[String],
    cursors: &mut [PrefixCursor],
    status: &mut bool,
) {
    let cursor = &mut cursors[dir.prefix];
    if !cursor.have_last {
        report_failure(test_file, dir, "requires prior match");
        *status = true;
        return;
    }
    let target = cursor.last_line;
    if target == 0 || target > lines.len() {
        report_failure(test_file, dir, "referenced line missing");
        *status = true;
        return;
    }
    if !regex_matches(dir, &lines[target - 1]) {
        report_failure(test_file, dir, "line mismatch");
        *status = true;
    }
}

/// The line after the cursor (line 1 with no prior match) must exist and
/// be empty; the cursor consumes it.
fn check_empty(
    test_file: &str,
    dir: &Directive,
    lines: &[String],
    cursors: &mut [PrefixCursor],
    status: &mut bool,
) {
    let cursor = &mut cursors[dir.prefix];
    let expected = if cursor.have_last {
        cursor.last_line + 1
    } else {
        1
    };
    if expected > lines.len() {
        report_failure(test_file, dir, "not enough output lines");
        *status = true;
        return;
    }
    if !lines[expected - 1].is_empty() {
        report_failure(test_file, dir, "expected blank line");
        *status = true;
        return;
    }
    cursor.last_line = expected;
    cursor.have_last = true;
}

/// No line anywhere in the output may match.
fn check_not(test_file: &str, dir: &Directive, lines: &[String], status: &mut bool) {
    for line in lines {
        if regex_matches(dir, line) {
            report_failure(test_file, dir, "pattern should not appear");
            *status = true;
            return;
        }
    }
}

/// Exactly `count_target` lines across the whole output must match.
fn check_count(test_file: &str, dir: &Directive, lines: &[String], status: &mut bool) {
    let found = lines.iter().filter(|line| regex_matches(dir, line)).count() as u64;
    if found != dir.count_target {
        let extra = format!("expected {} matches, got {}", dir.count_target, found);
        report_failure(test_file, dir, &extra);
        *status = true;
    }
}
