//! Subcommands of the `mdimg` binary.

use std::path::PathBuf;

use clap::Subcommand;

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Migrate every image linked from a document and write the rewritten copy
    Migrate {
        /// Markdown or HTML document to migrate
        input: PathBuf,
        /// Where to write the rewritten document (default: processed/{task_id}.md)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Run id; reuse an earlier id to resume an interrupted run
        #[arg(long)]
        task_id: Option<String>,
        /// Print the full report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// List the image references found in a document without fetching them
    Extract {
        /// Markdown or HTML document to scan
        input: PathBuf,
    },

    /// Validate the configuration and show the selected storage backend
    CheckConfig,

    /// Delete an object from the configured storage
    DeleteObject {
        /// Object key, e.g. images/post-1/image_0.png
        key: String,
    },

    /// Remove the checkpoint saved for a run
    ClearState {
        /// Run id whose checkpoint should be removed
        task_id: String,
    },
}
