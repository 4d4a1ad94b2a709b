use anyhow::{Context, Result};

use platemate_sync_core::SyncConfig;
use platemate_sync_core::inspect::{TableStatus, inspect_store};
use platemate_sync_core::models::Side;
use platemate_sync_core::store::{PostgresStore, SqliteStore};

use super::helpers::status_table;

fn collect(config: &SyncConfig) -> Result<Vec<TableStatus>> {
    let mut local = SqliteStore::open(&config.local_db_path)?;
    let mut statuses =
        inspect_store(&mut local, Side::Local).context("Failed to inspect local database")?;

    let mut remote = PostgresStore::connect(&config.database_url)
        .context("Failed to connect to the remote database")?;
    statuses.extend(
        inspect_store(&mut remote, Side::Remote).context("Failed to inspect remote database")?,
    );
    Ok(statuses)
}

pub(super) fn print_overview(config: &SyncConfig) -> Result<()> {
    println!("{}", status_table(&collect(config)?));
    Ok(())
}

pub(crate) fn cmd_inspect(config: &SyncConfig, json: bool) -> Result<()> {
    let statuses = collect(config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        println!("{}", status_table(&statuses));
    }
    Ok(())
}
