use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use platemate_sync_core::inspect::TableStatus;
use platemate_sync_core::{EntityOutcome, SyncReport};

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Table")]
    table: &'static str,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Restored")]
    restored: u64,
    #[tabled(rename = "Restore failed")]
    restore_failed: u64,
    #[tabled(rename = "Created")]
    created: u64,
    #[tabled(rename = "Updated")]
    updated: u64,
    #[tabled(rename = "Unchanged")]
    unchanged: u64,
    #[tabled(rename = "Skipped")]
    skipped: u64,
    #[tabled(rename = "Duplicate")]
    duplicate: u64,
}

pub(crate) fn outcome_label(outcome: &EntityOutcome) -> String {
    match outcome {
        EntityOutcome::Completed => "ok".to_string(),
        EntityOutcome::Unavailable(reason) => format!("unavailable: {}", truncate(reason, 40)),
        EntityOutcome::Failed(reason) => format!("FAILED: {}", truncate(reason, 40)),
    }
}

pub(crate) fn report_table(report: &SyncReport) -> String {
    let rows: Vec<ReportRow> = report
        .entities
        .iter()
        .map(|e| ReportRow {
            table: e.table,
            status: outcome_label(&e.outcome),
            restored: e.counts.restored,
            restore_failed: e.counts.restore_failed,
            created: e.counts.created,
            updated: e.counts.updated,
            unchanged: e.counts.unchanged,
            skipped: e.counts.skipped,
            duplicate: e.counts.duplicate,
        })
        .collect();

    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string()
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Store")]
    side: String,
    #[tabled(rename = "Table")]
    table: &'static str,
    #[tabled(rename = "Exists")]
    exists: &'static str,
    #[tabled(rename = "Columns")]
    columns: usize,
    #[tabled(rename = "Rows")]
    rows: u64,
}

pub(crate) fn status_table(statuses: &[TableStatus]) -> String {
    let rows: Vec<StatusRow> = statuses
        .iter()
        .map(|s| StatusRow {
            side: s.side.to_string(),
            table: s.table,
            exists: if s.exists { "yes" } else { "no" },
            columns: s.columns,
            rows: s.rows,
        })
        .collect();

    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..)).with(Alignment::right()))
        .to_string()
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use platemate_sync_core::EntityReport;
    use platemate_sync_core::entity::EntityKind;
    use platemate_sync_core::models::Side;

    fn report() -> SyncReport {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut profile = EntityReport::new(EntityKind::Profile);
        profile.counts.created = 2;
        let mut logs = EntityReport::new(EntityKind::NutritionLog);
        logs.outcome = EntityOutcome::Failed("connection reset by peer".into());
        SyncReport {
            run_id: uuid::Uuid::nil(),
            started_at: at,
            finished_at: at,
            entities: vec![profile, logs],
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world, this is long", 10), "hello w...");
    }

    #[test]
    fn test_outcome_label() {
        assert_eq!(outcome_label(&EntityOutcome::Completed), "ok");
        assert!(outcome_label(&EntityOutcome::Failed("boom".into())).starts_with("FAILED"));
    }

    #[test]
    fn test_report_table_lists_each_entity() {
        let table = report_table(&report());
        assert!(table.contains("users"));
        assert!(table.contains("food_logs"));
        assert!(table.contains("FAILED: connection reset by peer"));
        assert!(table.contains("Duplicate"));
    }

    #[test]
    fn test_status_table() {
        let statuses = vec![TableStatus {
            side: Side::Remote,
            table: "users",
            exists: true,
            columns: 16,
            rows: 42,
        }];
        let table = status_table(&statuses);
        assert!(table.contains("remote"));
        assert!(table.contains("42"));
    }
}
