//! Command line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// shellcache - offline resource cache for the application shell
///
/// Plays the hosting runtime: delivers install, activate, fetch, message
/// and sync events to the cache manager against the on-disk stores.
#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SHELLCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the serving origin
    #[arg(long, global = true, env = "SHELLCACHE_ORIGIN")]
    pub origin: Option<String>,

    /// Override the directory holding the cache stores
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Also write logs to daily files in this directory
    #[arg(long, global = true, env = "SHELLCACHE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cache every shell resource; fails if any of them cannot be fetched
    Install,

    /// Delete cache generations that do not belong to this build
    Activate,

    /// Resolve a request through the cache manager
    Fetch(FetchArgs),

    /// Post a control message, e.g. '{"type":"SKIP_WAITING"}'
    Message {
        /// Message as JSON
        json: String,
    },

    /// Deliver a sync event; the refresh tag re-fetches the shell
    Sync {
        /// Sync tag (defaults to the configured refresh tag)
        #[arg(long)]
        tag: Option<String>,
    },

    /// List cache stores and their entries
    Status,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Absolute URL, or a path resolved against the origin
    pub target: String,

    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Write the body to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
