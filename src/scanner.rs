//! Test-file directive scanner.
//!
//! One read pass over a test file collects the RUN command list (with
//! backslash continuation), the REQUIRES/UNSUPPORTED feature sets, the
//! XFAIL flag, and the ALLOW_RETRIES allowance. Directive substrings are
//! re-scanned on every line, so several directives may coexist on one line.

use std::io::{self, BufRead};

/// Everything the orchestrator needs to know about one test file.
/// Constructed by one scan pass, consumed once, then dropped.
#[derive(Debug, Default)]
pub struct TestScript {
    /// RUN commands, post-continuation-join, pre-substitution.
    pub runs: Vec<String>,
    pub requires: Vec<String>,
    pub unsupported: Vec<String>,
    pub xfail: bool,
    pub xfail_reason: Option<String>,
    /// Expected failures allowed per RUN step; last valid directive wins.
    pub allow_retries: Option<u32>,
}

impl TestScript {
    /// Scan `reader` line by line. `origin` labels diagnostics (the test
    /// file path as the user wrote it).
    pub fn parse<R: BufRead>(reader: R, origin: &str) -> io::Result<Self> {
        let mut script = TestScript::default();
        let mut pending: Option<String> = None;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end();

            scan_features(line, "REQUIRES:", &mut script.requires);
            scan_features(line, "UNSUPPORTED:", &mut script.unsupported);
            scan_xfail(line, &mut script.xfail, &mut script.xfail_reason);
            scan_allow_retries(line, origin, &mut script.allow_retries);

            if let Some(cmd) = parse_comment_run(line) {
                push_or_continue(&mut script.runs, &mut pending, cmd);
            } else if pending.is_some() {
                push_or_continue(&mut script.runs, &mut pending, line);
            }
        }
        if let Some(rest) = pending {
            script.runs.push(rest);
        }
        Ok(script)
    }
}

/// Join `piece` onto a pending continuation (single space separator) and
/// either buffer it again (trailing backslash) or emit the finished command.
fn push_or_continue(runs: &mut Vec<String>, pending: &mut Option<String>, piece: &str) {
    let joined = match pending.take() {
        Some(prefix) => format!("{} {}", prefix, piece),
        None => piece.to_string(),
    };
    match joined.strip_suffix('\\') {
        Some(stripped) => *pending = Some(stripped.to_string()),
        None => runs.push(joined),
    }
}

/// `// RUN: cmd`, `# RUN: cmd`, or `; RUN: cmd` with optional whitespace
/// around the comment leader.
fn parse_comment_run(line: &str) -> Option<&str> {
    let s = line.trim_start_matches([' ', '\t']);
    let s = if let Some(rest) = s.strip_prefix("//") {
        rest
    } else if let Some(rest) = s.strip_prefix('#') {
        rest
    } else if let Some(rest) = s.strip_prefix(';') {
        rest
    } else {
        return None;
    };
    let s = s.trim_start_matches([' ', '\t']);
    let s = s.strip_prefix("RUN:")?;
    Some(s.trim_start_matches([' ', '\t']))
}

fn scan_features(line: &str, marker: &str, out: &mut Vec<String>) {
    let Some(pos) = line.find(marker) else {
        return;
    };
    let rest = &line[pos + marker.len()..];
    for tok in rest.split(|c: char| c == ',' || c.is_whitespace()) {
        if !tok.is_empty() {
            out.push(tok.to_string());
        }
    }
}

fn scan_xfail(line: &str, xfail: &mut bool, reason: &mut Option<String>) {
    let Some(pos) = line.find("XFAIL:") else {
        return;
    };
    let rest = line[pos + "XFAIL:".len()..].trim();
    *reason = if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    };
    *xfail = true;
}

fn scan_allow_retries(line: &str, origin: &str, value: &mut Option<u32>) {
    let Some(pos) = line.find("ALLOW_RETRIES:") else {
        return;
    };
    let rest = line[pos + "ALLOW_RETRIES:".len()..].trim();
    match rest.parse::<u32>() {
        Ok(v) => *value = Some(v),
        Err(_) => eprintln!("{}: invalid ALLOW_RETRIES directive", origin),
    }
}
