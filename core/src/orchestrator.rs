use chrono::Utc;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::engine::ReconciliationEngine;
use crate::entity::{EntityKind, PROFILE, all_mappers};
use crate::error::{Result, SyncError};
use crate::models::{Side, SyncReport};
use crate::schema::{SchemaCache, SchemaProbe};
use crate::store::{LocalStore, PostgresStore, RemoteStore, SqliteStore};

/// Everything one run works with: both store handles and the schema
/// capabilities probed at the start of the run.
pub struct SyncContext<L, R> {
    pub local: L,
    pub remote: R,
    local_schema: SchemaCache,
    remote_schema: SchemaCache,
}

impl<L, R> SyncContext<L, R> {
    pub fn new(local: L, remote: R) -> Self {
        Self {
            local,
            remote,
            local_schema: SchemaCache::default(),
            remote_schema: SchemaCache::default(),
        }
    }

    #[must_use]
    pub fn schema(&self, side: Side) -> &SchemaCache {
        match side {
            Side::Local => &self.local_schema,
            Side::Remote => &self.remote_schema,
        }
    }

    pub fn into_stores(self) -> (L, R) {
        (self.local, self.remote)
    }
}

/// Runs the profile entity, then every dependent entity, in a fixed order.
pub struct SyncOrchestrator<L, R> {
    ctx: SyncContext<L, R>,
}

impl<L: LocalStore, R: RemoteStore> SyncOrchestrator<L, R> {
    pub fn new(local: L, remote: R) -> Self {
        Self {
            ctx: SyncContext::new(local, remote),
        }
    }

    #[must_use]
    pub fn context(&self) -> &SyncContext<L, R> {
        &self.ctx
    }

    pub fn into_context(self) -> SyncContext<L, R> {
        self.ctx
    }

    /// Execute one full run.
    ///
    /// Connectivity, schema probe and lock failures abort before any entity
    /// is touched. Entity failures are recorded in the report instead.
    pub fn run(&mut self) -> Result<SyncReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync", %run_id);
        let _entered = span.enter();
        let started_at = Utc::now().naive_utc();
        info!("Starting sync");

        self.ctx.local.ping().map_err(SyncError::Connectivity)?;
        self.ctx.remote.ping().map_err(SyncError::Connectivity)?;

        if !self.ctx.remote.try_lock_run()? {
            warn!("Another sync run holds the lock");
            return Err(SyncError::AlreadyRunning);
        }
        let result = self.run_entities();
        if let Err(e) = self.ctx.remote.unlock_run() {
            warn!(error = %e, "Failed to release the sync lock");
        }

        let report = SyncReport {
            run_id,
            started_at,
            finished_at: Utc::now().naive_utc(),
            entities: result?,
        };
        let totals = report.totals();
        info!(
            success = report.is_success(),
            restored = totals.restored,
            created = totals.created,
            updated = totals.updated,
            unchanged = totals.unchanged,
            skipped = totals.skipped,
            duplicate = totals.duplicate,
            "Sync finished"
        );
        Ok(report)
    }

    fn run_entities(&mut self) -> Result<Vec<crate::models::EntityReport>> {
        let mappers = all_mappers();
        self.ctx.local_schema = SchemaProbe::probe_all(&mut self.ctx.local, Side::Local, &mappers)?;
        self.ctx.remote_schema =
            SchemaProbe::probe_all(&mut self.ctx.remote, Side::Remote, &mappers)?;

        let mut engine = ReconciliationEngine::new(
            &mut self.ctx.local,
            &mut self.ctx.remote,
            &self.ctx.local_schema,
            &self.ctx.remote_schema,
        );

        let mut entities = Vec::with_capacity(EntityKind::ORDER.len());
        entities.push(engine.reconcile(&PROFILE));
        engine.refresh_owners()?;
        for kind in EntityKind::ORDER.into_iter().filter(|k| k.is_child()) {
            entities.push(engine.reconcile(kind.mapper()));
        }
        Ok(entities)
    }
}

/// Open both stores from `config` and run one sync.
pub fn sync_with_config(config: &SyncConfig) -> Result<SyncReport> {
    let local = SqliteStore::open(&config.local_db_path).map_err(SyncError::Connectivity)?;
    let remote = PostgresStore::connect(&config.database_url).map_err(SyncError::Connectivity)?;
    SyncOrchestrator::new(local, remote).run()
}

/// Run one sync and report whether it succeeded. Details go to the log.
#[must_use]
pub fn perform_sync(config: &SyncConfig) -> bool {
    match sync_with_config(config) {
        Ok(report) => report.is_success(),
        Err(e) => {
            error!(error = %e, "Sync aborted");
            false
        }
    }
}
