//! CLI parse: clap types for Easel. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Easel CLI - Sequenced image generation with retry, fallback and review
#[derive(Parser)]
#[command(name = "easel")]
#[command(about = "Creative generation orchestrator for sequenced image jobs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".", global = true)]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (info level unless --log-level is given)
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a manifest of units of work through the sequencer
    Generate {
        /// JSON manifest: a list of units, or {"units": [...]}
        #[arg(long)]
        manifest: PathBuf,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Generate variations of a primary artifact in parallel
    Vary {
        /// Parent artifact id (full id or unique prefix)
        parent: String,
        /// JSON manifest: a list of specs, or {"variations": [...]}
        #[arg(long)]
        manifest: PathBuf,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List artifacts
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
        /// Only show artifacts with this status
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one artifact in detail
    Show {
        /// Artifact id (full id or unique prefix)
        id: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Approve a completed artifact
    Approve {
        /// Artifact id (full id or unique prefix)
        id: String,
    },
    /// Reject a completed artifact
    Reject {
        /// Artifact id (full id or unique prefix)
        id: String,
    },
    /// Delete an artifact and its derivatives
    Delete {
        /// Artifact id (full id or unique prefix)
        id: String,
    },
    /// Retry a completed or failed artifact
    Retry {
        /// Artifact id (full id or unique prefix)
        id: String,
    },
}
