// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Exact-match text substitution.

use serde::Deserialize;

use crate::error::MutationError;

/// A requested substitution in one file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOperation {
    /// Target path as given by the caller; normalized against the workspace.
    pub file_path: String,

    /// The exact text to find.
    pub old_string: String,

    /// The text to replace it with.
    pub new_string: String,

    /// Replace every occurrence instead of requiring exactly one.
    #[serde(default)]
    pub replace_all: bool,
}

impl EditOperation {
    pub fn new(
        file_path: impl Into<String>,
        old_string: impl Into<String>,
        new_string: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            old_string: old_string.into(),
            new_string: new_string.into(),
            replace_all: false,
        }
    }

    pub fn with_replace_all(mut self, replace_all: bool) -> Self {
        self.replace_all = replace_all;
        self
    }
}

/// Apply `op` to `content` and return the new content.
///
/// Without `replace_all` the old string must occur exactly once; a second
/// occurrence is searched for starting one character after the first, so
/// overlapping matches also count as ambiguous.
///
/// An empty old string, or an old string equal to the new one, is rejected
/// with [`MutationError::InvalidEdit`] before any search. Only a missing
/// match yields `NotFound` and only a repeated one `AmbiguousMatch`.
pub fn apply_edit(content: &str, op: &EditOperation, path: &str) -> Result<String, MutationError> {
    if op.old_string.is_empty() {
        return Err(MutationError::InvalidEdit(
            "oldString must not be empty".to_string(),
        ));
    }
    if op.old_string == op.new_string {
        return Err(MutationError::InvalidEdit(
            "newString must be different from oldString".to_string(),
        ));
    }

    let not_found = || MutationError::NotFound {
        path: path.to_string(),
        needle: truncate_for_error(&op.old_string, 80),
    };

    if op.replace_all {
        let replaced = content.replace(&op.old_string, &op.new_string);
        if replaced == content {
            return Err(not_found());
        }
        return Ok(replaced);
    }

    let index = content.find(&op.old_string).ok_or_else(not_found)?;

    let step = content[index..]
        .chars()
        .next()
        .map(char::len_utf8)
        .unwrap_or(1);
    if content[index + step..].contains(&op.old_string) {
        return Err(MutationError::AmbiguousMatch {
            path: path.to_string(),
            needle: truncate_for_error(&op.old_string, 80),
            count: content.matches(&op.old_string).count().max(2),
        });
    }

    let mut result = String::with_capacity(content.len() + op.new_string.len());
    result.push_str(&content[..index]);
    result.push_str(&op.new_string);
    result.push_str(&content[index + op.old_string.len()..]);
    Ok(result)
}

/// Truncate a string for error messages.
fn truncate_for_error(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
