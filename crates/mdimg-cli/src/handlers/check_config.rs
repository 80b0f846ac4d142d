//! Check-config command handler.
//!
//! Reaching this handler means bootstrap already validated the settings and
//! built the storage adapter; all that is left is to show what was resolved.

use mdimg_core::StorageSettings;

use crate::bootstrap::CliContext;

pub fn execute(ctx: &CliContext) {
    let s = ctx.settings();
    println!("Configuration OK");
    println!("  storage backend      = {}", s.storage.backend_name());
    match &s.storage {
        StorageSettings::Local { base_dir, base_url } => {
            println!("  storage dir          = {}", base_dir.display());
            println!("  storage url          = {base_url}");
        }
        StorageSettings::S3Compatible {
            endpoint, bucket, ..
        } => {
            println!("  endpoint             = {endpoint}");
            println!("  bucket               = {bucket}");
            println!("  public url (sample)  = {}", ctx.storage.public_url("images/example.png"));
        }
    }
    println!("  concurrent downloads = {}", s.max_concurrent_downloads);
    println!("  download timeout     = {}s", s.download_timeout_secs);
    println!("  max retries          = {}", s.max_retries);
    println!("  max file size        = {} bytes", s.max_file_size_bytes);
    println!("  staging dir          = {}", s.staging_dir.display());
    println!("  state dir            = {}", s.state_dir.display());
    println!("  output dir           = {}", ctx.config.output_dir.display());
}
