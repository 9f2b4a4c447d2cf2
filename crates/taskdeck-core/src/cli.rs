use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskdeck",
    version,
    about = "Taskdeck: command-line client for the shared to-do service",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "taskdeckrc")]
    pub taskdeckrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List tasks as a filtered, sorted, paginated page.
    List {
        /// Status filter: all, todo, doing, done.
        #[arg(long)]
        status: Option<String>,

        /// Category filter: all, work, personal, shopping, health, education, other.
        #[arg(long)]
        category: Option<String>,

        /// Deadline filter: all, overdue, today, next7d, next30d, nodeadline.
        #[arg(long)]
        due: Option<String>,

        /// Case-insensitive substring match on titles.
        #[arg(long)]
        search: Option<String>,

        /// 1-based page number.
        #[arg(long)]
        page: Option<usize>,
    },

    /// Create a task on the server.
    Add {
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// high, medium or low. Defaults to medium.
        #[arg(long)]
        priority: Option<String>,

        /// Defaults to work.
        #[arg(long)]
        category: Option<String>,

        /// todo, doing or done. Defaults to todo.
        #[arg(long)]
        status: Option<String>,

        /// Deadline expression, e.g. tomorrow, friday, 2026-03-01 17:00, +3d.
        #[arg(long)]
        deadline: Option<String>,
    },

    /// Update fields of an existing task.
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        deadline: Option<String>,
    },

    /// Mark a task done.
    Done { id: String },

    /// Move a completed task back to todo.
    Undone { id: String },

    /// Mark a task as in progress.
    Doing { id: String },

    /// Delete a task from the server.
    Delete { id: String },

    /// Delete all of your completed tasks.
    ClearCompleted,

    /// Show one task in full.
    Show { id: String },

    /// Create an account on the server.
    Register {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        age: u32,

        #[arg(long)]
        phone: String,
    },

    /// Log in and store the session token.
    Login {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    /// Drop the stored session.
    Logout,

    /// Print the identity claims of the stored session.
    Whoami,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
