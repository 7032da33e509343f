use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use shared::{
    domain::{merge_documents, Document, Entity, EntityId, SyncStatus},
    error::StoreError,
};
use tracing::{info, warn};

use crate::{query, with_request_timeout, Core, SyncEvent};

/// Executes add/update/remove with connectivity-classified fallback to
/// optimistic local state. Non-connectivity failures propagate to the
/// caller untouched and leave the list as it was.
#[derive(Clone)]
pub struct MutationController {
    core: Arc<Core>,
}

impl MutationController {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    pub async fn add(&self, fields: Document) -> Result<Entity, StoreError> {
        let core = &self.core;
        let result =
            with_request_timeout(core.options.request_timeout, core.adapter.add(&fields)).await;
        match result {
            Ok(record) => {
                let entity = Entity::confirmed(record);
                let stored = entity.clone();
                apply(core, move |entities| upsert(entities, stored)).await;
                after_remote_success(core);
                Ok(entity)
            }
            Err(StoreError::Connectivity(kind)) => {
                warn!(kind = ?kind, "sync: add fell back to optimistic local create");
                let now = Utc::now();
                let entity = Entity {
                    id: EntityId::new_local(),
                    created_at: now,
                    updated_at: now,
                    fields,
                    status: SyncStatus::PendingCreate,
                };
                let stored = entity.clone();
                apply(core, move |entities| upsert(entities, stored)).await;
                after_connectivity_failure(core, kind);
                Ok(entity)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn update(&self, id: &EntityId, partial: Document) -> Result<Entity, StoreError> {
        let core = &self.core;
        {
            let state = core.state.lock().await;
            if !state
                .entities
                .iter()
                .any(|entity| &entity.id == id && entity.is_visible())
            {
                return Err(StoreError::NotFound(id.clone()));
            }
        }

        let result = with_request_timeout(
            core.options.request_timeout,
            core.adapter.update(id, &partial),
        )
        .await;
        match result {
            Ok(()) => {
                let updated = apply(core, |entities| {
                    merge_live(entities, id, &partial, false)
                })
                .await;
                // The entity can only vanish here through a concurrent
                // remove landing between the check and the merge.
                let entity = updated.ok_or_else(|| StoreError::NotFound(id.clone()))?;
                after_remote_success(core);
                Ok(entity)
            }
            Err(StoreError::Connectivity(kind)) => {
                warn!(kind = ?kind, id = %id, "sync: update fell back to optimistic local merge");
                let updated = apply(core, |entities| {
                    merge_live(entities, id, &partial, true)
                })
                .await;
                let entity = updated.ok_or_else(|| StoreError::NotFound(id.clone()))?;
                after_connectivity_failure(core, kind);
                Ok(entity)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn remove(&self, id: &EntityId) -> Result<(), StoreError> {
        let core = &self.core;
        let live = {
            let state = core.state.lock().await;
            match state.entities.iter().find(|entity| &entity.id == id) {
                None => return Err(StoreError::NotFound(id.clone())),
                Some(entity) => entity.is_visible(),
            }
        };
        if !live {
            // Already tombstoned; removing again is a no-op.
            return Ok(());
        }

        let result =
            with_request_timeout(core.options.request_timeout, core.adapter.remove(id)).await;
        match result {
            Ok(()) => {
                apply(core, |entities| entities.retain(|entity| &entity.id != id)).await;
                after_remote_success(core);
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                // The remote store no longer knows the id, so the
                // delete is effectively confirmed.
                apply(core, |entities| entities.retain(|entity| &entity.id != id)).await;
                Ok(())
            }
            Err(StoreError::Connectivity(kind)) => {
                warn!(kind = ?kind, id = %id, "sync: remove tombstoned entity for later reconciliation");
                apply(core, |entities| {
                    if let Some(entity) = entities.iter_mut().find(|entity| &entity.id == id) {
                        entity.status = SyncStatus::PendingDelete;
                        entity.updated_at = Utc::now();
                    }
                })
                .await;
                after_connectivity_failure(core, kind);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Fixture helper: runs `count` synthetic records through the
    /// regular `add` path.
    pub async fn seed_mock_entities(&self, count: usize) -> Result<Vec<Entity>, StoreError> {
        let mut seeded = Vec::with_capacity(count);
        for index in 0..count {
            let mut fields = Document::new();
            fields.insert(
                "name".to_string(),
                json!(format!("Sample record {}", index + 1)),
            );
            fields.insert("seeded".to_string(), json!(true));
            seeded.push(self.add(fields).await?);
        }
        info!(count, "sync: seeded mock entities");
        Ok(seeded)
    }
}

/// Single write path into the entity list. Bumping the generation
/// inside the lock guarantees any in-flight fetch is invalidated
/// before it can observe the new state.
async fn apply<R>(core: &Arc<Core>, mutate: impl FnOnce(&mut Vec<Entity>) -> R) -> R {
    let result = {
        let mut state = core.state.lock().await;
        let result = mutate(&mut state.entities);
        core.next_generation();
        result
    };
    core.emit(SyncEvent::EntitiesChanged);
    result
}

fn upsert(entities: &mut Vec<Entity>, entity: Entity) {
    if let Some(existing) = entities.iter_mut().find(|known| known.id == entity.id) {
        *existing = entity;
    } else {
        entities.push(entity);
    }
}

fn merge_live(
    entities: &mut [Entity],
    id: &EntityId,
    partial: &Document,
    pending: bool,
) -> Option<Entity> {
    let entity = entities
        .iter_mut()
        .find(|entity| &entity.id == id && entity.is_visible())?;
    merge_documents(&mut entity.fields, partial);
    entity.updated_at = Utc::now();
    if pending {
        let status = std::mem::replace(&mut entity.status, SyncStatus::Confirmed);
        entity.status = status.after_local_update(partial);
    }
    Some(entity.clone())
}

fn after_remote_success(core: &Arc<Core>) {
    if core.offline.mark_online() {
        core.emit(SyncEvent::ConnectivityChanged { is_offline: false });
        query::spawn_reconnect_fetch(core);
    }
}

fn after_connectivity_failure(core: &Arc<Core>, kind: shared::error::ConnectivityKind) {
    if core.offline.mark_offline(kind) {
        core.emit(SyncEvent::ConnectivityChanged { is_offline: true });
    }
}
