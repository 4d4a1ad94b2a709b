use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

pub const LOCAL_DB_PATH_VAR: &str = "LOCAL_DB_PATH";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const DEFAULT_LOCAL_DB: &str = "sqlite:///./platemate_local.db";

/// Where the two stores live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub local_db_path: PathBuf,
    pub database_url: String,
}

impl SyncConfig {
    pub fn new(local_db_path: impl Into<PathBuf>, database_url: impl Into<String>) -> Self {
        Self {
            local_db_path: local_db_path.into(),
            database_url: database_url.into(),
        }
    }

    /// Read `LOCAL_DB_PATH` and `DATABASE_URL` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let local = lookup(LOCAL_DB_PATH_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOCAL_DB.to_string());
        let database_url = lookup(DATABASE_URL_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SyncError::config(format!("{DATABASE_URL_VAR} is not set")))?;
        Ok(Self {
            local_db_path: local_db_path(&local),
            database_url,
        })
    }
}

/// Accept either a bare path or a `sqlite:///` URL.
#[must_use]
pub fn local_db_path(raw: &str) -> PathBuf {
    let raw = raw.trim();
    Path::new(raw.strip_prefix("sqlite:///").unwrap_or(raw)).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_local_path() {
        let config =
            SyncConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://u@h/db")])).unwrap();
        assert_eq!(config.local_db_path, PathBuf::from("./platemate_local.db"));
        assert_eq!(config.database_url, "postgres://u@h/db");
    }

    #[test]
    fn test_strips_sqlite_prefix() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://u@h/db"),
            ("LOCAL_DB_PATH", "sqlite:///data/app.db"),
        ]))
        .unwrap();
        assert_eq!(config.local_db_path, PathBuf::from("data/app.db"));
        assert_eq!(local_db_path("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_missing_database_url_is_config_error() {
        let err = SyncConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        let err = SyncConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
