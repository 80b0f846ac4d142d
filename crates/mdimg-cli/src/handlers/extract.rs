//! Extract command handler.

use std::path::Path;

use mdimg_core::{Extraction, extract_references};

use crate::error::CliError;
use crate::presentation::print_extraction;

/// List the image references in `input` without touching the network.
pub async fn execute(input: &Path) -> Result<Extraction, CliError> {
    let document = tokio::fs::read_to_string(input)
        .await
        .map_err(|e| CliError::Io(format!("cannot read {}: {e}", input.display())))?;
    let extraction = extract_references(&document);
    print_extraction(&extraction);
    Ok(extraction)
}
