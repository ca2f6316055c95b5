//! Placeholder expansion engine.
//!
//! Expands `%NAME`, `%%`, and `%(fn arg)` tokens against a pluggable lookup
//! callback. The engine is stateless: the runner wires it to the config
//! table and the builtin path table, the checker to the substitution blob
//! inherited from the runner. Recursion happens only inside `%(...)`
//! arguments; fixed-point iteration over config chains is the planner's job.

use std::fs;
use std::io;

use thiserror::Error;

/// Lookup callback resolving a placeholder identifier to its value.
/// Returning `None` leaves the `%identifier` text in place.
pub type Lookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("unterminated %(: {0}")]
    UnterminatedCall(String),

    #[error("empty %( ) expression")]
    EmptyCall,

    #[error("missing argument for {0}")]
    MissingArgument(String),

    #[error("invalid argument for %(basename)")]
    InvalidBasenameArg,

    #[error("invalid suffix for %(basename)")]
    InvalidBasenameSuffix,

    #[error("%(basename) accepts at most two arguments")]
    TooManyBasenameArgs,

    #[error("realpath {path}: {source}")]
    Realpath { path: String, source: io::Error },

    #[error("unknown placeholder function: {0}")]
    UnknownFunction(String),
}

/// Expand all placeholders in `input`.
///
/// With `allow_expansion` false the input is returned verbatim. With
/// `helpers_enabled` false, `%(` has no special meaning and is emitted as a
/// literal `%` followed by `(`.
pub fn expand(
    input: &str,
    allow_expansion: bool,
    helpers_enabled: bool,
    lookup: &Lookup<'_>,
) -> Result<String, ExpandError> {
    if !allow_expansion {
        return Ok(input.to_string());
    }

    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            // Copy one character, whole. Only '%' starts a token, so
            // multi-byte characters pass through untouched.
            let Some(ch) = input[i..].chars().next() else {
                break;
            };
            out.push(ch);
            i += ch.len_utf8();
            continue;
        }
        if bytes.get(i + 1) == Some(&b'%') {
            out.push('%');
            i += 2;
            continue;
        }
        if helpers_enabled && bytes.get(i + 1) == Some(&b'(') {
            let body_start = i + 2;
            let close = match find_matching_paren(&input[body_start..]) {
                Some(off) => body_start + off,
                None => return Err(ExpandError::UnterminatedCall(input.to_string())),
            };
            let body = &input[body_start..close];
            let replacement = run_call(body, helpers_enabled, lookup)?;
            out.push_str(&replacement);
            i = close + 1;
            continue;
        }
        let mut j = i + 1;
        while j < bytes.len() && is_ident_byte(bytes[j]) {
            j += 1;
        }
        if j > i + 1 {
            let key = &input[i + 1..j];
            match lookup(key) {
                Some(val) => out.push_str(&val),
                None => {
                    out.push('%');
                    out.push_str(key);
                }
            }
            i = j;
        } else {
            out.push('%');
            i += 1;
        }
    }
    Ok(out)
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Offset of the `)` matching an already-consumed `(`, honoring nested
/// balanced pairs. `None` if the text runs out first.
fn find_matching_paren(s: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a `%( ... )` body into name and argument region, recursively
/// expand the argument, and dispatch to the builtin function set.
fn run_call(
    body: &str,
    helpers_enabled: bool,
    lookup: &Lookup<'_>,
) -> Result<String, ExpandError> {
    let trimmed = body.trim_start();
    if trimmed.is_empty() {
        return Err(ExpandError::EmptyCall);
    }
    let (name, arg) = match trimmed.find(|c: char| c.is_whitespace()) {
        Some(pos) => (&trimmed[..pos], trimmed[pos..].trim()),
        None => (trimmed, ""),
    };
    if arg.is_empty() {
        return Err(ExpandError::MissingArgument(name.to_string()));
    }
    let arg = expand(arg, true, helpers_enabled, lookup)?;
    run_builtin(name, &arg)
}

fn run_builtin(name: &str, arg: &str) -> Result<String, ExpandError> {
    match name {
        "basename" => builtin_basename(arg),
        "dirname" => {
            let src = if arg.is_empty() { "." } else { arg };
            Ok(posix_dirname(src))
        }
        "realpath" => {
            let src = if arg.is_empty() { "." } else { arg };
            match fs::canonicalize(src) {
                Ok(resolved) => Ok(resolved.to_string_lossy().into_owned()),
                Err(source) => Err(ExpandError::Realpath {
                    path: src.to_string(),
                    source,
                }),
            }
        }
        _ => Err(ExpandError::UnknownFunction(name.to_string())),
    }
}

/// `basename PATH [SUFFIX]` with shell-style argument tokenisation.
fn builtin_basename(arg: &str) -> Result<String, ExpandError> {
    let mut cursor = arg;
    let path = match next_token(&mut cursor) {
        Ok(Some(tok)) => tok,
        Ok(None) | Err(()) => return Err(ExpandError::InvalidBasenameArg),
    };
    let suffix = match next_token(&mut cursor) {
        Ok(tok) => tok,
        Err(()) => return Err(ExpandError::InvalidBasenameSuffix),
    };
    if !cursor.trim_start().is_empty() {
        return Err(ExpandError::TooManyBasenameArgs);
    }
    let mut leaf = posix_basename(&path);
    if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
        if !leaf.is_empty() && leaf.len() >= suffix.len() && leaf.ends_with(&suffix) {
            leaf.truncate(leaf.len() - suffix.len());
        }
    }
    Ok(leaf)
}

/// One shell-style token: single quotes are literal, double quotes allow
/// backslash escapes, a backslash outside single quotes escapes the next
/// character. `Ok(None)` means the region was exhausted; `Err` means an
/// unterminated quote.
fn next_token(cursor: &mut &str) -> Result<Option<String>, ()> {
    let s = cursor.trim_start();
    if s.is_empty() {
        *cursor = s;
        return Ok(None);
    }
    let mut out = String::new();
    let mut quote: Option<char> = None;
    let mut chars = s.char_indices();
    let mut end = s.len();
    while let Some((i, c)) = chars.next() {
        if quote.is_none() && c.is_whitespace() {
            end = i;
            break;
        }
        match quote {
            None if c == '\'' || c == '"' => {
                quote = Some(c);
            }
            Some(q) if c == q => {
                quote = None;
            }
            _ if c == '\\' && quote != Some('\'') => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => {
                    out.push('\\');
                    end = s.len();
                    break;
                }
            },
            _ => out.push(c),
        }
    }
    if quote.is_some() {
        return Err(());
    }
    *cursor = &s[end..];
    Ok(Some(out))
}

/// POSIX `basename(3)`: trailing slashes stripped, `""` is `.`,
/// all-slashes is `/`.
fn posix_basename(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.rfind('/') {
        Some(i) => trimmed[i + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

/// POSIX `dirname(3)`: `""` and slash-free paths are `.`, `/usr/` is `/`,
/// `/usr/lib` is `/usr`.
fn posix_dirname(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => trimmed[..i].trim_end_matches('/').to_string(),
        None => ".".to_string(),
    }
}
