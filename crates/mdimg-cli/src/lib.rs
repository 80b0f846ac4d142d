//! Command-line adapter for mdimg.
//!
//! `main.rs` parses arguments, initialises logging and dispatches to
//! [`handlers`]; everything concrete is wired in [`bootstrap`].

#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use async_trait as _;
#[cfg(test)]
use image as _;

// Used by the binary target only
use anyhow as _;
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;

pub use bootstrap::{CliConfig, CliContext, bootstrap};
pub use commands::Commands;
pub use error::CliError;
pub use parser::Cli;
