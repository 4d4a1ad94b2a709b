use anyhow::{Context, Result};
use std::path::PathBuf;

use platemate_sync_core::SyncConfig;
use platemate_sync_core::config::{
    DATABASE_URL_VAR, DEFAULT_LOCAL_DB, LOCAL_DB_PATH_VAR, local_db_path,
};

/// Build the sync configuration from the environment (after `.env` has
/// been loaded), letting command-line values win.
pub fn load_config(local_db: Option<PathBuf>, database_url: Option<String>) -> Result<SyncConfig> {
    let env = |name: &str| match name {
        DATABASE_URL_VAR if database_url.is_some() => database_url.clone(),
        _ => std::env::var(name).ok(),
    };
    let mut config = SyncConfig::from_lookup(env)
        .context("Failed to load sync configuration (set DATABASE_URL or pass --database-url)")?;
    if let Some(path) = local_db {
        config.local_db_path = local_db_path(&path.to_string_lossy());
    }
    Ok(config)
}

/// Local database path alone, for commands that never touch the remote store.
pub fn local_only_path(local_db: Option<PathBuf>) -> PathBuf {
    local_db.unwrap_or_else(|| {
        let raw = std::env::var(LOCAL_DB_PATH_VAR).unwrap_or_else(|_| DEFAULT_LOCAL_DB.to_string());
        local_db_path(&raw)
    })
}
