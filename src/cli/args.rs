//! CLI argument definitions using clap
//!
//! Commands:
//! - ossgate put <bucket> <key> <text>
//! - ossgate put-file <bucket> <key> <path>
//! - ossgate put-url <bucket> <key> <url>
//! - ossgate cat | get | rm | exists | url <bucket> <key> ...
//! - ossgate mb | info | rb <bucket>
//! - ossgate ls
//!
//! Configuration comes from `--config <path>` or, without it, `OSS_*` environment variables.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ossgate - object storage with signed URL policy
#[derive(Parser, Debug)]
#[command(name = "ossgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Serve buckets from this directory instead of the network
    #[arg(long, global = true)]
    pub local: Option<PathBuf>,

    /// Log transfer progress
    #[arg(long, global = true)]
    pub progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload text content
    Put {
        bucket: String,
        key: String,
        content: String,
    },

    /// Upload a local file
    PutFile {
        bucket: String,
        key: String,
        path: PathBuf,
    },

    /// Fetch a remote URL and upload its body
    PutUrl {
        bucket: String,
        key: String,
        url: String,
    },

    /// Print an object's lines
    Cat { bucket: String, key: String },

    /// Download an object to a local file
    Get {
        bucket: String,
        key: String,
        path: PathBuf,
    },

    /// Delete an object
    Rm { bucket: String, key: String },

    /// Check whether an object exists
    Exists { bucket: String, key: String },

    /// Print an access URL for an existing object
    Url { bucket: String, key: String },

    /// Create a bucket if it is absent
    Mb { bucket: String },

    /// List buckets
    Ls,

    /// Describe a bucket
    Info { bucket: String },

    /// Delete a bucket
    Rb { bucket: String },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
