// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Unified diff generation and application.
//!
//! Lines are compared including their terminators, so a missing final
//! newline shows up as a change and is marked with
//! `\ No newline at end of file`, as `git diff` does.

use std::time::{Duration, Instant};

use similar::{Algorithm, ChangeTag, TextDiff};

use crate::error::MutationError;

/// Context lines around each change.
pub const CONTEXT_LINES: usize = 3;

/// Time budget for finding a minimal diff. Past it the diff is still
/// correct, just coarser.
const DIFF_DEADLINE: Duration = Duration::from_millis(500);

const NO_NEWLINE: &str = "\\ No newline at end of file";

/// Split content into lines, keeping each line's `\n`.
fn tokens(content: &str) -> Vec<&str> {
    content.split_inclusive('\n').collect()
}

/// Compute a unified diff of two full file contents.
///
/// Both sides are labelled with `label`. Identical inputs produce only the
/// two header lines. Hunk ranges always carry an explicit length.
pub fn compute_diff(label: &str, before: &str, after: &str) -> String {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .deadline(Instant::now() + DIFF_DEADLINE)
        .diff_lines(before, after);

    let mut out = format!("--- {label}\n+++ {label}\n");

    for group in diff.grouped_ops(CONTEXT_LINES) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_start = first.old_range().start;
        let new_start = first.new_range().start;
        let old_len = last.old_range().end - old_start;
        let new_len = last.new_range().end - new_start;

        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            old_start + usize::from(old_len > 0),
            old_len,
            new_start + usize::from(new_len > 0),
            new_len
        ));

        for op in &group {
            for change in diff.iter_changes(op) {
                out.push(match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                });
                let text = change.value();
                out.push_str(text.strip_suffix('\n').unwrap_or(text));
                out.push('\n');
                if change.missing_newline() {
                    out.push_str(NO_NEWLINE);
                    out.push('\n');
                }
            }
        }
    }

    out
}

/// Strip the indentation shared by every non-blank body line of a diff.
///
/// Only the rendering changes; headers and hunk markers are untouched. A diff
/// with no body lines or no common indent is returned as is.
pub fn normalize_indent(raw: &str) -> String {
    let lines: Vec<&str> = raw.split('\n').collect();
    let Some(first_hunk) = lines.iter().position(|l| l.starts_with("@@")) else {
        return raw.to_string();
    };
    let is_body = |i: usize, line: &str| i > first_hunk && line.starts_with(['+', '-', ' ']);

    let indent = lines
        .iter()
        .enumerate()
        .filter(|(i, l)| is_body(*i, l))
        .map(|(_, l)| &l[1..])
        .filter(|text| !text.trim().is_empty())
        .map(|text| text.chars().take_while(|c| c.is_whitespace()).count())
        .min();

    let indent = match indent {
        Some(n) if n > 0 => n,
        _ => return raw.to_string(),
    };

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if !is_body(i, line) {
                return line.to_string();
            }
            let (prefix, text) = line.split_at(1);
            let skip: usize = text
                .chars()
                .take(indent)
                .take_while(|c| c.is_whitespace())
                .map(char::len_utf8)
                .sum();
            format!("{}{}", prefix, &text[skip..])
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Count `(added, removed)` lines in a unified diff.
pub fn diff_stats(diff: &str) -> (usize, usize) {
    let mut in_body = false;
    let (mut added, mut removed) = (0, 0);
    for line in diff.lines() {
        if line.starts_with("@@") {
            in_body = true;
        } else if in_body && line.starts_with('+') {
            added += 1;
        } else if in_body && line.starts_with('-') {
            removed += 1;
        }
    }
    (added, removed)
}

/// Apply a unified diff produced by [`compute_diff`] to `before`.
pub fn apply_diff(before: &str, diff: &str) -> Result<String, MutationError> {
    let old = tokens(before);
    let mut out = String::with_capacity(before.len());
    let mut pos = 0usize;
    let mut lines = diff.split_inclusive('\n').peekable();

    while let Some(line) = lines.next() {
        if !line.starts_with("@@") {
            continue;
        }
        let (old_start, old_len) = parse_hunk_header(line)?;
        let begin = if old_len == 0 {
            old_start
        } else {
            old_start
                .checked_sub(1)
                .ok_or_else(|| malformed(format!("bad hunk header: {}", line.trim_end())))?
        };
        if begin < pos || begin > old.len() {
            return Err(malformed(format!("hunk out of order: {}", line.trim_end())));
        }
        for token in &old[pos..begin] {
            out.push_str(token);
        }
        pos = begin;

        let mut body: Vec<(char, String)> = Vec::new();
        while let Some(next) = lines.next_if(|l| !l.starts_with("@@")) {
            if next.starts_with('\\') {
                if let Some((_, text)) = body.last_mut() {
                    if text.ends_with('\n') {
                        text.pop();
                    }
                }
                continue;
            }
            let mut chars = next.chars();
            match chars.next() {
                Some(kind @ (' ' | '-' | '+')) => body.push((kind, chars.as_str().to_string())),
                _ => return Err(malformed(format!("unexpected line: {}", next.trim_end()))),
            }
        }

        for (kind, text) in body {
            if kind == '+' {
                out.push_str(&text);
                continue;
            }
            match old.get(pos) {
                Some(current) if *current == text => {
                    if kind == ' ' {
                        out.push_str(current);
                    }
                    pos += 1;
                }
                _ => {
                    return Err(malformed(format!(
                        "line {} does not match: {}",
                        pos + 1,
                        text.trim_end()
                    )))
                }
            }
        }
    }

    for token in &old[pos..] {
        out.push_str(token);
    }
    Ok(out)
}

fn parse_hunk_header(line: &str) -> Result<(usize, usize), MutationError> {
    let old_range = line
        .trim_start_matches("@@")
        .split_whitespace()
        .next()
        .and_then(|r| r.strip_prefix('-'))
        .ok_or_else(|| malformed(format!("bad hunk header: {}", line.trim_end())))?;

    let parse = |s: &str| {
        s.parse::<usize>()
            .map_err(|_| malformed(format!("bad hunk header: {}", line.trim_end())))
    };
    match old_range.split_once(',') {
        Some((start, len)) => Ok((parse(start)?, parse(len)?)),
        None => Ok((parse(old_range)?, 1)),
    }
}

fn malformed(message: String) -> MutationError {
    MutationError::InvalidEdit(format!("diff does not apply: {}", message))
}
