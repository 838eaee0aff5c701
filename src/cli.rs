use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::engine::ScopeFilter;

#[derive(Parser, Debug)]
#[command(name = "gh-org-secrets")]
#[command(about = "Reconcile GitHub organization and repository secrets and variables", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to the XDG location)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch existing secrets and variables
    Fetch(FetchArgs),
    /// Create or update secrets and variables from a rows file
    Update(UpdateArgs),
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// GitHub organization name
    #[arg(long)]
    pub org: Option<String>,

    /// GitHub access token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Scope to process
    #[arg(long, value_enum, default_value_t = ScopeFilter::Both)]
    pub scope: ScopeFilter,

    /// REST API base URL (GitHub Enterprise Server)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Rows applied concurrently
    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Include variable values in the output
    #[arg(long)]
    pub fetch_values: bool,

    /// Also list deployment environment secrets and variables
    #[arg(long)]
    pub environments: bool,

    /// Write rows to this file instead of standard output
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// JSON rows file with type, name, value, visibility, selectedrepositories and repository columns
    #[arg(long)]
    pub rows: PathBuf,
}
