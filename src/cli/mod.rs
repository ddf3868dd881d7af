use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mylobster-memory",
    version,
    about = "Hybrid lexical and vector search over agent memory files"
)]
pub struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub log_json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index the workspace memory files.
    Sync(SyncOpts),
    /// Search the memory index.
    Search(SearchOpts),
    /// Show index counters.
    Status(StatusOpts),
    Config(ConfigOpts),
    Version,
}

impl Commands {
    /// Config file named on the command line, if any.
    pub fn config_path(&self) -> Option<&str> {
        match self {
            Commands::Sync(opts) => opts.config.as_deref(),
            Commands::Search(opts) => opts.config.as_deref(),
            Commands::Status(opts) => opts.config.as_deref(),
            Commands::Config(opts) => opts.config.as_deref(),
            Commands::Version => None,
        }
    }
}

#[derive(clap::Args)]
pub struct SyncOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    /// Rebuild the index from scratch.
    #[arg(short, long)]
    pub force: bool,
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct SearchOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    pub query: String,
    #[arg(short = 'n', long)]
    pub max_results: Option<usize>,
    #[arg(long)]
    pub min_score: Option<f64>,
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct StatusOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct ConfigOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Validate,
    Init,
}
