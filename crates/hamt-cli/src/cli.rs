use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hamtcli", about = "HAMT container tool", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Block store directory (overrides the config file)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the tool version
    Version,
    /// Create and commit an empty container, printing its address
    New(NewArgs),
    /// Set key/value pairs on a container
    Set(SetArgs),
    /// Get a value by key
    Get(GetArgs),
    /// List the keys and values of a container
    List(ListArgs),
    /// Link a child container into a parent under the child's identity
    Link(LinkArgs),
}

#[derive(Args)]
pub struct NewArgs {
    /// Container identity (defaults to the configured identity)
    pub identity: Option<String>,
}

#[derive(Args)]
pub struct SetArgs {
    pub address: String,
    /// Alternating keys and values
    #[arg(required = true, num_args = 2..)]
    pub pairs: Vec<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub address: String,
    pub key: String,
}

#[derive(Args)]
pub struct ListArgs {
    pub address: String,
}

#[derive(Args)]
pub struct LinkArgs {
    pub parent: String,
    pub child: String,
}
