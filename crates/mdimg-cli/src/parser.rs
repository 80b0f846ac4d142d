//! Root CLI parser and global options.

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for migrating images linked from Markdown and
/// HTML documents into object storage.
#[derive(Parser, Debug)]
#[command(name = "mdimg")]
#[command(about = "Migrate images linked from Markdown/HTML documents into your own storage")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Load configuration from this dotenv file instead of `./.env`
    #[arg(long = "env-file", global = true)]
    pub env_file: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}
