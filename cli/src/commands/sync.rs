use anyhow::{Context, Result, bail};
use tracing::debug;

use platemate_sync_core::{SyncConfig, sync_with_config};

use super::helpers::report_table;
use super::inspect::print_overview;

pub(crate) fn cmd_sync(config: &SyncConfig, json: bool, inspect: bool) -> Result<()> {
    debug!(local_db = %config.local_db_path.display(), "Using local database");

    if inspect && !json {
        println!("Before sync:");
        print_overview(config)?;
    }

    let report = sync_with_config(config).context("Sync aborted")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report_table(&report));
        let totals = report.totals();
        println!(
            "Run {}: {} restored, {} created, {} updated, {} skipped, {} duplicate",
            report.run_id,
            totals.restored,
            totals.created,
            totals.updated,
            totals.skipped,
            totals.duplicate
        );
        if inspect {
            println!("After sync:");
            print_overview(config)?;
        }
    }

    let failed: Vec<&str> = report
        .entities
        .iter()
        .filter(|e| e.is_failed())
        .map(|e| e.table)
        .collect();
    if !failed.is_empty() {
        bail!("Sync failed for {}", failed.join(", "));
    }
    Ok(())
}
