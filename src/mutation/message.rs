// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Commit message styling.
//!
//! Messages are lowercase English: the first letter is lowered unless the
//! first word is a code symbol (`camelCase`, `SCREAMING_CASE`, `snake_case`,
//! `kebab-case`, `PascalCase`, `$var`, paths, qualified names) which is kept
//! verbatim.

use once_cell::sync::Lazy;
use regex::Regex;

/// Opening characters that are skipped when picking the letter to lower.
const OPENERS: &[char] = &['(', '[', '<', '{', '"', '\''];

/// Trailing punctuation ignored when classifying the first word.
const TRAILING: &[char] = &[',', '.', ':', ';', '!', '?', ')', ']', '>', '}', '"', '\''];

static SYMBOL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([_$][A-Za-z0-9_$]*|[A-Z0-9_]+|[a-z0-9]+(?:[-_][a-z0-9]+)+|[a-z][A-Za-z0-9]*[A-Z][A-Za-z0-9]*|[A-Z][a-z0-9]+(?:[A-Z][A-Za-z0-9]+)+)$",
    )
    .expect("symbol pattern is valid")
});

static PLAIN_CAPITALIZED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][a-z]+$").expect("capitalized pattern is valid"));

/// Apply the commit message style to a description.
pub fn style_commit_message(description: &str) -> String {
    let description = description.trim();
    let first_word = description.split_whitespace().next().unwrap_or("");

    let skip_opener = first_word.starts_with(OPENERS);
    let word = if skip_opener {
        &first_word[1..]
    } else {
        first_word
    };
    let word = word.trim_end_matches(TRAILING);

    if is_code_symbol(word) {
        return description.to_string();
    }

    let mut chars = description.char_indices();
    if skip_opener {
        chars.next();
    }
    match chars.next() {
        Some((idx, ch)) => {
            let mut styled = String::with_capacity(description.len());
            styled.push_str(&description[..idx]);
            styled.extend(ch.to_lowercase());
            styled.push_str(&description[idx + ch.len_utf8()..]);
            styled
        }
        None => description.to_string(),
    }
}

fn is_code_symbol(word: &str) -> bool {
    if word.is_empty() || PLAIN_CAPITALIZED.is_match(word) {
        return false;
    }
    if SYMBOL.is_match(word) {
        return true;
    }
    // Paths, file names and qualified names such as `Foo::bar` or `fn()`.
    match word.char_indices().nth(1) {
        Some((idx, _)) => word[idx..].contains(['.', '/', ':', '(']),
        None => false,
    }
}
