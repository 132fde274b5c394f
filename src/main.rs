// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! codi-wt entry point - isolated edits, worktrees and agent servers.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use codi_worktree::config::{self, CliOptions, ResolvedConfig};
use codi_worktree::identity::IsolationPolicy;
use codi_worktree::mutation::{diff_stats, EditOperation};
use codi_worktree::orchestrator::{EditRequest, MutationOutcome, Orchestrator, WriteRequest};
use codi_worktree::telemetry::{init_telemetry, TelemetryConfig, GLOBAL_METRICS};

/// codi-wt version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// codi-wt - Session isolation for coding agents.
#[derive(Parser)]
#[command(name = "codi-wt")]
#[command(author, version, about = "Session isolation for coding agents", long_about = None)]
struct Cli {
    /// Repository root (defaults to the current directory)
    #[arg(short, long, env = "CODI_WT_REPO")]
    repo: Option<PathBuf>,

    /// Session handle the command acts for
    #[arg(short, long, env = "CODI_WT_SESSION", default_value = "cli")]
    session: String,

    /// Directory for agent state, relative to the repository root
    #[arg(long)]
    agent_dir: Option<String>,

    /// Agent server command
    #[arg(long, env = "CODI_WT_SERVER")]
    server_command: Option<String>,

    /// Agent profile passed with each prompt
    #[arg(long)]
    agent_profile: Option<String>,

    /// Agent server startup timeout in milliseconds
    #[arg(long)]
    startup_timeout_ms: Option<u64>,

    /// Show informational logs
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Show debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Isolation policy for spawned agents.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    /// Share the repository checkout
    Lazy,
    /// Run in a dedicated worktree
    Worktree,
}

impl From<Policy> for IsolationPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Lazy => IsolationPolicy::Lazy,
            Policy::Worktree => IsolationPolicy::Worktree,
        }
    }
}

/// Subcommands for codi-wt.
#[derive(Subcommand)]
enum Commands {
    /// Replace text in a file and commit it on the session branch
    Edit {
        /// File to edit, relative to the workspace
        file: String,
        /// Exact text to replace
        #[arg(long)]
        old: String,
        /// Replacement text
        #[arg(long)]
        new: String,
        /// Replace every occurrence
        #[arg(long)]
        replace_all: bool,
        /// Commit description
        #[arg(short, long)]
        description: Option<String>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a whole file and commit it on the session branch
    Write {
        /// File to write, relative to the workspace
        file: String,
        /// Commit description
        #[arg(short, long)]
        description: String,
        /// New content (read from stdin when omitted)
        #[arg(long)]
        content: Option<String>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the identity derived for the session
    Identity {
        #[arg(long, value_enum, default_value = "worktree")]
        policy: Policy,
    },

    /// Start an agent, hand it a task and print what it says
    Spawn {
        /// Initial task
        prompt: String,
        #[arg(long, value_enum, default_value = "worktree")]
        policy: Policy,
        /// Follow-up prompts sent after the initial task
        #[arg(long = "then")]
        follow_ups: Vec<String>,
    },

    /// List git worktrees
    Worktrees {
        #[arg(long)]
        json: bool,
    },

    /// Remove a worktree
    RemoveWorktree {
        path: PathBuf,
    },

    /// Show resolved configuration
    Config,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _telemetry = init_telemetry(&TelemetryConfig::from_verbosity(cli.verbose, cli.debug))?;

    let repo_root = match &cli.repo {
        Some(repo) => repo.clone(),
        None => std::env::current_dir()?,
    };
    let cli_options = CliOptions {
        agent_dir: cli.agent_dir.clone(),
        server_command: cli.server_command.clone(),
        agent_profile: cli.agent_profile.clone(),
        startup_timeout_ms: cli.startup_timeout_ms,
    };
    let config = config::load_config(&repo_root, cli_options)?;

    let debug = cli.debug;
    let orchestrator = Orchestrator::new(&repo_root, config);
    let result = handle_command(&orchestrator, &cli.session, cli.command).await;

    let stopped = orchestrator.shutdown().await;
    if stopped > 0 {
        tracing::info!(stopped, "Stopped agent servers");
    }
    if debug {
        eprintln!("{}", GLOBAL_METRICS.snapshot().format_report().dimmed());
    }
    result
}

async fn handle_command(
    orchestrator: &Orchestrator,
    session: &str,
    command: Commands,
) -> anyhow::Result<()> {
    match command {
        Commands::Edit {
            file,
            old,
            new,
            replace_all,
            description,
            json,
        } => {
            let operation = EditOperation::new(file, old, new).with_replace_all(replace_all);
            let request = EditRequest::new(operation, description.as_deref());
            let outcome = orchestrator.edit_file(session, &request).await?;
            print_mutation(&outcome, json)?;
        }
        Commands::Write {
            file,
            description,
            content,
            json,
        } => {
            let content = match content {
                Some(content) => content,
                None => std::io::read_to_string(std::io::stdin())?,
            };
            let request = WriteRequest::new(file, content, description);
            let outcome = orchestrator.write_file(session, &request).await?;
            print_mutation(&outcome, json)?;
        }
        Commands::Identity { policy } => {
            let identity = orchestrator.identity(session, policy.into());
            println!("{}", "Agent identity".bright_blue().bold());
            println!("Name:   {}", identity.workspace_name().bright_white());
            println!("Author: {} <{}>", identity.user_name, identity.user_email);
            println!("Branch: {}", identity.branch_name.cyan());
        }
        Commands::Spawn {
            prompt,
            policy,
            follow_ups,
        } => {
            let outcome = orchestrator
                .spawn_agent(session, policy.into(), &prompt)
                .await?;
            println!("{} {}", "Agent".bright_blue().bold(), outcome.name.bright_white());
            println!("Branch: {}", outcome.branch_name.cyan());
            if let Some(path) = &outcome.workspace_path {
                println!("Workspace: {}", path.display());
            }
            println!("\n{}", outcome.message);

            for follow_up in &follow_ups {
                let reply = orchestrator.send_prompt(&outcome.name, follow_up).await?;
                println!("\n{} {}", ">".dimmed(), follow_up.dimmed());
                println!("{}", reply);
            }
        }
        Commands::Worktrees { json } => {
            let entries = orchestrator.worktrees().await?;
            if json {
                let rows: Vec<_> = entries
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "path": e.path,
                            "head": e.head,
                            "branch": e.branch,
                            "detached": e.detached,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}", "Worktrees".bright_blue().bold());
                for entry in &entries {
                    let branch = match (&entry.branch, entry.detached) {
                        (Some(branch), _) => branch.cyan().to_string(),
                        (None, true) => "(detached)".dimmed().to_string(),
                        (None, false) => "-".dimmed().to_string(),
                    };
                    println!("  {} [{}]", entry.path.display(), branch);
                }
            }
        }
        Commands::RemoveWorktree { path } => {
            let released = orchestrator.remove_worktree(&path).await?;
            println!("Removed worktree: {}", path.display());
            for session in released {
                println!("  released session {}", session.dimmed());
            }
        }
        Commands::Config => {
            print_config(orchestrator.config())?;
        }
        Commands::Version => {
            println!("codi-wt {}", VERSION);
        }
    }
    Ok(())
}

fn print_mutation(outcome: &MutationOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    if outcome.committed {
        println!("{}", outcome.output.green());
    } else {
        println!("{}", outcome.output.yellow());
    }
    if !outcome.diff.is_empty() {
        let (added, removed) = diff_stats(&outcome.diff);
        println!(
            "{} {}\n",
            format!("+{}", added).green(),
            format!("-{}", removed).red()
        );
        for line in outcome.diff.lines() {
            if line.starts_with('+') && !line.starts_with("+++") {
                println!("{}", line.green());
            } else if line.starts_with('-') && !line.starts_with("---") {
                println!("{}", line.red());
            } else {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn print_config(config: &ResolvedConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
