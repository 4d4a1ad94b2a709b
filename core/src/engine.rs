//! Two-phase reconciliation of one entity.
//!
//! Phase A fills an empty local table from the remote store. Phase B makes
//! the remote store match local, with local winning every disagreement.

use std::collections::HashMap;

use tracing::{debug, error, info, info_span, warn};

use crate::entity::{
    EntityKind, EntityMapper, OwnerIndex, PROFILE, PROFILE_ID_COLUMN, PROFILE_UID_COLUMN,
};
use crate::error::StoreError;
use crate::models::{EntityOutcome, EntityReport, Field, FieldKind, IdentityKey, Row, Side};
use crate::schema::{SchemaCache, SchemaCapabilities};
use crate::store::{LocalStore, RemoteStore, RemoteWrite};

const PROFILE_ID_FIELDS: [Field; 2] = [
    Field::new(PROFILE_ID_COLUMN, FieldKind::Integer),
    Field::new(PROFILE_UID_COLUMN, FieldKind::Text),
];

#[derive(Debug, Default, Clone, Copy)]
struct RestoreCounts {
    restored: u64,
    failed: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct PushCounts {
    created: u64,
    updated: u64,
    unchanged: u64,
    skipped: u64,
    duplicate: u64,
}

pub struct ReconciliationEngine<'a, L: ?Sized, R: ?Sized> {
    local: &'a mut L,
    remote: &'a mut R,
    local_schema: &'a SchemaCache,
    remote_schema: &'a SchemaCache,
    owners: OwnerIndex,
}

impl<'a, L, R> ReconciliationEngine<'a, L, R>
where
    L: LocalStore + ?Sized,
    R: RemoteStore + ?Sized,
{
    pub fn new(
        local: &'a mut L,
        remote: &'a mut R,
        local_schema: &'a SchemaCache,
        remote_schema: &'a SchemaCache,
    ) -> Self {
        Self {
            local,
            remote,
            local_schema,
            remote_schema,
            owners: OwnerIndex::default(),
        }
    }

    /// Reload the profile id maps of both stores. Call after the profile
    /// entity has been reconciled so newly created remote profiles count.
    pub fn refresh_owners(&mut self) -> Result<(), StoreError> {
        let local = load_profile_ids(&mut *self.local, self.local_schema)?;
        let remote = load_profile_ids(&mut *self.remote, self.remote_schema)?;
        self.owners = OwnerIndex::from_rows(&local, &remote);
        debug!(
            local = local.len(),
            remote = remote.len(),
            "Loaded profile ids"
        );
        Ok(())
    }

    /// Run both phases for one entity. Errors are contained in the report.
    pub fn reconcile(&mut self, mapper: &EntityMapper) -> EntityReport {
        let span = info_span!("entity", kind = %mapper.kind);
        let _entered = span.enter();
        let mut report = EntityReport::new(mapper.kind);

        let (local_caps, remote_caps) = match self.capabilities(mapper) {
            Ok(caps) => caps,
            Err(reason) => {
                warn!(table = mapper.table, reason = %reason, "Skipping entity");
                report.outcome = EntityOutcome::Unavailable(reason);
                return report;
            }
        };

        match self.restore(mapper, &local_caps, &remote_caps) {
            Ok(restore) => {
                report.counts.restored = restore.restored;
                report.counts.restore_failed = restore.failed;
            }
            Err(e) => {
                error!(table = mapper.table, error = %e, "Restore phase failed");
                report.outcome = EntityOutcome::Failed(e.to_string());
                return report;
            }
        }

        match self.push(mapper, &local_caps, &remote_caps) {
            Ok(push) => {
                report.counts.created = push.created;
                report.counts.updated = push.updated;
                report.counts.unchanged = push.unchanged;
                report.counts.skipped = push.skipped;
                report.counts.duplicate = push.duplicate;
            }
            Err(e) => {
                error!(
                    table = mapper.table,
                    error = %e,
                    "Push phase failed; remote changes for this entity were rolled back"
                );
                report.outcome = EntityOutcome::Failed(e.to_string());
            }
        }
        report
    }

    fn capabilities(
        &self,
        mapper: &EntityMapper,
    ) -> Result<(SchemaCapabilities, SchemaCapabilities), String> {
        let local = self
            .local_schema
            .get(mapper.table)
            .cloned()
            .unwrap_or_default();
        let remote = self
            .remote_schema
            .get(mapper.table)
            .cloned()
            .unwrap_or_default();
        for (side, caps) in [(Side::Local, &local), (Side::Remote, &remote)] {
            if !caps.table_exists() {
                return Err(format!("table {} does not exist in the {side} store", mapper.table));
            }
            let missing = mapper.missing_key_columns(caps);
            if !missing.is_empty() {
                return Err(format!(
                    "{side} table {} lacks key columns {}",
                    mapper.table,
                    missing.join(", ")
                ));
            }
        }
        Ok((local, remote))
    }

    fn restore(
        &mut self,
        mapper: &EntityMapper,
        local_caps: &SchemaCapabilities,
        remote_caps: &SchemaCapabilities,
    ) -> Result<RestoreCounts, StoreError> {
        let mut counts = RestoreCounts::default();
        if self.local.count(mapper.table)? > 0 {
            debug!(table = mapper.table, "Local table has data; restore skipped");
            return Ok(counts);
        }
        let remote_rows = self
            .remote
            .load(mapper.table, &mapper.read_fields(remote_caps))?;
        if remote_rows.is_empty() {
            return Ok(counts);
        }
        info!(
            table = mapper.table,
            rows = remote_rows.len(),
            "Local table is empty; restoring from remote"
        );

        let mut pending = Vec::with_capacity(remote_rows.len());
        for row in &remote_rows {
            let owner_id = if mapper.has_owner() {
                let local_id = mapper
                    .owner_uid(row, Side::Remote, &self.owners)
                    .and_then(|uid| self.owners.id(Side::Local, uid));
                if local_id.is_none() {
                    warn!(
                        table = mapper.table,
                        "Remote row's owner has no local profile; not restored"
                    );
                    counts.failed += 1;
                    continue;
                }
                local_id
            } else {
                None
            };
            pending.push(mapper.map_row(row, local_caps, owner_id));
        }

        for result in self.local.restore_rows(mapper.table, &pending)? {
            match result {
                Ok(()) => counts.restored += 1,
                Err(e) => {
                    warn!(table = mapper.table, error = %e, "Row not restored");
                    counts.failed += 1;
                }
            }
        }
        info!(
            table = mapper.table,
            restored = counts.restored,
            failed = counts.failed,
            "Restore phase finished"
        );
        Ok(counts)
    }

    fn push(
        &mut self,
        mapper: &EntityMapper,
        local_caps: &SchemaCapabilities,
        remote_caps: &SchemaCapabilities,
    ) -> Result<PushCounts, StoreError> {
        let mut counts = PushCounts::default();
        let local_rows = self
            .local
            .load(mapper.table, &mapper.read_fields(local_caps))?;
        let remote_rows = self
            .remote
            .load(mapper.table, &mapper.read_fields(remote_caps))?;

        let mut remote_index: HashMap<IdentityKey, Row> = HashMap::with_capacity(remote_rows.len());
        for row in remote_rows {
            if let Some(key) = mapper.identity_key(&row, Side::Remote, &self.owners) {
                remote_index.entry(key).or_insert(row);
            }
        }

        // Later local rows with the same key replace earlier ones.
        let mut order: Vec<IdentityKey> = Vec::new();
        let mut latest: HashMap<IdentityKey, Row> = HashMap::new();
        for row in local_rows {
            let Some(key) = mapper.identity_key(&row, Side::Local, &self.owners) else {
                warn!(table = mapper.table, "Local row has no usable identity key; skipped");
                counts.skipped += 1;
                continue;
            };
            if latest.insert(key.clone(), row).is_some() {
                warn!(
                    table = mapper.table,
                    key = %key,
                    "Duplicate local key; earlier row replaced by a later one"
                );
                counts.duplicate += 1;
            } else {
                order.push(key);
            }
        }

        let mut writes = Vec::new();
        for key in order {
            let Some(row) = latest.remove(&key) else {
                continue;
            };

            let owner_id = if mapper.has_owner() {
                let remote_id = mapper
                    .owner_uid(&row, Side::Local, &self.owners)
                    .and_then(|uid| self.owners.id(Side::Remote, uid));
                if remote_id.is_none() {
                    warn!(
                        table = mapper.table,
                        key = %key,
                        "Owner profile does not exist remotely; skipped"
                    );
                    counts.skipped += 1;
                    continue;
                }
                remote_id
            } else {
                None
            };

            let mut mapped = mapper.map_row(&row, remote_caps, owner_id);
            match remote_index.get(&key) {
                Some(existing) => {
                    mapper.drop_unset_stamps(&mut mapped);
                    let differs = mapped.iter().any(|(c, v)| existing.get(c) != Some(v));
                    if !differs {
                        counts.unchanged += 1;
                        continue;
                    }
                    let values: Row = mapped
                        .iter()
                        .filter(|(c, _)| !mapper.is_key_column(c))
                        .map(|(c, v)| (c.clone(), v.clone()))
                        .collect();
                    debug!(table = mapper.table, key = %key, "Updating remote row");
                    writes.push(RemoteWrite::Update {
                        key: mapper.key_columns(&mapped, owner_id),
                        values,
                    });
                    counts.updated += 1;
                }
                None => {
                    mapper.stamp_new_row(&mut mapped, remote_caps);
                    debug!(table = mapper.table, key = %key, "Creating remote row");
                    writes.push(RemoteWrite::Insert(mapped));
                    counts.created += 1;
                }
            }
        }

        if !writes.is_empty() {
            if let Err(e) = self.remote.apply(mapper.table, &writes) {
                if mapper.kind == EntityKind::AchievementUnlock && e.is_conflict() {
                    warn!(
                        table = mapper.table,
                        "Unlock rejected; the remote achievements catalog may lack some achievement ids"
                    );
                }
                return Err(e);
            }
        }
        info!(
            table = mapper.table,
            created = counts.created,
            updated = counts.updated,
            unchanged = counts.unchanged,
            skipped = counts.skipped,
            duplicate = counts.duplicate,
            "Push phase finished"
        );
        Ok(counts)
    }
}

fn load_profile_ids<S>(store: &mut S, schema: &SchemaCache) -> Result<Vec<Row>, StoreError>
where
    S: crate::store::Store + ?Sized,
{
    let readable = schema
        .get(PROFILE.table)
        .is_some_and(|caps| caps.has(PROFILE_ID_COLUMN) && caps.has(PROFILE_UID_COLUMN));
    if !readable {
        return Ok(Vec::new());
    }
    store.load(PROFILE.table, &PROFILE_ID_FIELDS)
}
