use anyhow::{Context, Result};
use std::path::Path;

use platemate_sync_core::store::SqliteStore;

pub(crate) fn cmd_init_local(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let store = SqliteStore::open(path)?;
    store
        .initialize()
        .with_context(|| format!("Failed to initialize {}", path.display()))?;
    println!("Local database ready at {}", path.display());
    Ok(())
}
