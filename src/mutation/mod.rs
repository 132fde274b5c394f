// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Atomic file mutations: exact-match edits, whole-file writes, unified
//! diffs, and single-file attributed commits.

pub mod diff;
mod edit;
mod engine;
mod message;

pub use diff::{apply_diff, compute_diff, diff_stats, normalize_indent};
pub use edit::{apply_edit, EditOperation};
pub use engine::{CommitOutcome, CommitRecord, MutationEngine};
pub use message::style_commit_message;
