// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Deterministic agent identities.
//!
//! A session handle is hashed with SHA-256; the first eight hex digits become
//! the identity hash, and their integer value seeds a ChaCha8 generator that
//! picks a pseudonym from a fixed name table. The same seed always yields the same
//! author, email, branch and workspace name.

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::ResolvedConfig;

/// Pattern for names of identity-derived agents, e.g. `ada-1f2e3d4c`.
static AGENT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z]+)-([a-f0-9]{8})$").expect("agent name pattern is valid"));

/// Pseudonyms drawn for derived identities.
const NAMES: &[&str] = &[
    "ada", "alan", "alice", "amara", "ambrose", "anika", "arlo", "astrid", "august", "aurora",
    "basil", "beatrix", "bennett", "bianca", "blake", "bram", "briar", "caleb", "camille",
    "casper", "cecil", "celeste", "clara", "cosmo", "dahlia", "dante", "darcy", "delia", "dexter",
    "dora", "edgar", "edith", "elias", "elio", "elowen", "emery", "enzo", "esme", "ezra", "felix",
    "fern", "fiona", "flynn", "frida", "gideon", "greta", "grover", "hazel", "hugo", "ida",
    "imogen", "ines", "iris", "ivo", "jasper", "juno", "kai", "keaton", "kira", "lars", "leona",
    "linus", "lorna", "lucian", "mabel", "magnus", "maren", "mateo", "milo", "mira", "nadia",
    "nell", "nico", "nora", "odette", "olin", "opal", "orson", "otto", "pablo", "pearl", "perry",
    "piper", "quinn", "rafael", "remy", "rhea", "rosa", "rufus", "sabine", "silas", "soren",
    "stella", "talia", "tess", "theo", "thea", "tobias", "ulla", "vera", "viggo", "vivian",
    "wade", "willa", "wren", "xavier", "yara", "yuri", "zara", "zelda", "zeno",
];

/// Which kind of agent an identity is derived for.
///
/// Both policies use the same derivation; they differ only in branch namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationPolicy {
    /// Shares the caller's checkout; mutations still commit on the agent branch.
    Lazy,
    /// Runs in its own worktree.
    Worktree,
}

/// Deterministic identity for one agent session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    /// First eight hex digits of the seed digest.
    pub hash: String,
    /// Lowercase pseudonym.
    pub middle_name: String,
    /// Capitalized pseudonym used as commit author.
    pub user_name: String,
    pub user_email: String,
    pub branch_name: String,
}

impl AgentIdentity {
    /// `<middle_name>-<hash>`, used for workspace directories and process names.
    pub fn workspace_name(&self) -> String {
        format!("{}-{}", self.middle_name, self.hash)
    }
}

/// Derives identities using the configured namespaces and email domain.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    email_domain: String,
    lazy_prefix: String,
    worktree_prefix: String,
}

impl IdentityResolver {
    pub fn new(
        email_domain: impl Into<String>,
        lazy_prefix: impl Into<String>,
        worktree_prefix: impl Into<String>,
    ) -> Self {
        Self {
            email_domain: email_domain.into(),
            lazy_prefix: lazy_prefix.into(),
            worktree_prefix: worktree_prefix.into(),
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(
            config.email_domain.clone(),
            config.lazy_branch_prefix.clone(),
            config.worktree_branch_prefix.clone(),
        )
    }

    /// Derive the identity for `seed`.
    ///
    /// When `known_name` is an agent name (`name-hash`), its parts are reused
    /// instead of hashing the seed, so a running agent keeps its identity.
    pub fn derive(
        &self,
        seed: &str,
        known_name: Option<&str>,
        policy: IsolationPolicy,
    ) -> AgentIdentity {
        let (middle_name, hash) = known_name
            .and_then(parse_agent_name)
            .unwrap_or_else(|| pseudonym_for(seed));

        let prefix = match policy {
            IsolationPolicy::Lazy => &self.lazy_prefix,
            IsolationPolicy::Worktree => &self.worktree_prefix,
        };

        AgentIdentity {
            user_name: capitalize(&middle_name),
            user_email: format!("{}@{}", middle_name, self.email_domain),
            branch_name: format!("{}/{}-{}", prefix, middle_name, hash),
            hash,
            middle_name,
        }
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::from_config(&ResolvedConfig::default())
    }
}

/// Whether `name` looks like an identity-derived agent name.
pub fn is_agent_name(name: &str) -> bool {
    AGENT_NAME.is_match(name)
}

/// Split an agent name into `(middle_name, hash)`.
pub fn parse_agent_name(name: &str) -> Option<(String, String)> {
    let caps = AGENT_NAME.captures(name)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

fn pseudonym_for(seed: &str) -> (String, String) {
    let digest = Sha256::digest(seed.as_bytes());
    // Four bytes are exactly eight hex digits.
    let hash: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);

    // ChaCha8 output for a given seed is fixed across rand_chacha releases.
    let mut rng = ChaCha8Rng::seed_from_u64(u64::from(value));
    let name = NAMES.choose(&mut rng).copied().unwrap_or("agent");
    (name.to_string(), hash)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
