//! `mdimg` entry point, the composition root.
//!
//! Configuration comes from the environment (optionally seeded from a
//! dotenv file), then [`bootstrap`] wires the adapters and the selected
//! handler runs.

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mdimg_cli::handlers::{self, migrate::MigrateArgs};
use mdimg_cli::{Cli, CliConfig, CliError, Commands, bootstrap};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .ok();
}

fn load_env(env_file: Option<&Path>) -> anyhow::Result<()> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

async fn dispatch(command: Commands) -> Result<i32, CliError> {
    // Extraction needs no configuration
    if let Commands::Extract { input } = &command {
        handlers::extract::execute(input).await?;
        return Ok(0);
    }

    let ctx = bootstrap(CliConfig::from_env()?)?;
    match command {
        Commands::Migrate {
            input,
            output,
            task_id,
            json,
        } => {
            let args = MigrateArgs {
                input,
                output,
                task_id,
                json,
            };
            let outcome = handlers::migrate::execute(&ctx, args).await?;
            if !outcome.report.summary.is_full_success() {
                return Ok(1);
            }
        }
        Commands::CheckConfig => handlers::check_config::execute(&ctx),
        Commands::DeleteObject { key } => handlers::delete_object::execute(&ctx, &key).await?,
        Commands::ClearState { task_id } => {
            handlers::clear_state::execute(&ctx, &task_id).await?;
        }
        Commands::Extract { .. } => {}
    }
    Ok(0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    load_env(cli.env_file.as_deref())?;
    init_tracing(cli.verbose);

    match dispatch(cli.command).await {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.exit_code());
        }
    }
}
