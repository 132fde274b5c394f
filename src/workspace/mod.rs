// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Workspace lifecycle: git plumbing, the session registry, and the manager
//! that ties a session identity to a branch-backed worktree.

pub mod git;
mod manager;
mod registry;

pub use git::{parse_worktree_list, CommitAuthor, Git, WorktreeEntry};
pub use manager::{normalize_target, ResolvedWorkspace, WorkspaceManager};
pub use registry::{WorkspaceRecord, WorkspaceRegistry};
