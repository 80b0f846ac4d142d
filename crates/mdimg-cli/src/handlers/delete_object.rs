//! Delete-object command handler.

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Remove `key` from the configured storage. Missing objects are not an error.
pub async fn execute(ctx: &CliContext, key: &str) -> Result<(), CliError> {
    if key.trim().is_empty() {
        return Err(CliError::Arguments("object key cannot be empty".to_string()));
    }
    ctx.storage.delete(key).await?;
    println!("Deleted {key}");
    Ok(())
}
