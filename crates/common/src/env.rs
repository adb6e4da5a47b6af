//! Environment/runtime helpers
//!
//! Sanity checks to ensure expected directories exist at startup.

use std::path::Path;
use tracing::warn;

/// Ensure the data directory exists; warn when the storage root is missing.
pub async fn ensure_env(data_dir: &str, storage_base: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {data_dir}: {e}"))?;
    if tokio::fs::metadata(storage_base).await.is_err() {
        warn!(storage_base = %storage_base.display(), "storage base path not found; installers will create it on demand");
    }
    Ok(())
}
