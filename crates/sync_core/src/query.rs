use std::{collections::HashSet, sync::Arc};

use shared::{domain::Entity, error::StoreError};
use tracing::{debug, warn};

use crate::{with_request_timeout, Core, SyncEvent};

/// Orchestrates collection fetches with last-request-wins semantics,
/// a fixed timeout race, and explicit cancellation.
#[derive(Clone)]
pub struct QueryController {
    core: Arc<Core>,
}

impl QueryController {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    /// Starting a new fetch invalidates any previously in-flight one;
    /// a superseded fetch resolves without touching the list even if
    /// it completes later.
    pub async fn fetch_all(&self) -> Result<Vec<Entity>, StoreError> {
        run_fetch(&self.core).await
    }

    /// Idempotent. Invalidates the in-flight fetch and clears the
    /// loading flag before returning; the dead fetch performs no state
    /// mutation when it eventually resolves. The bump happens under the
    /// state lock so a fetch starting concurrently cannot have its
    /// loading flag cleared out from under it.
    pub async fn cancel(&self) {
        let mut state = self.core.state.lock().await;
        self.core.next_generation();
        state.loading_generation = None;
    }
}

pub(crate) async fn run_fetch(core: &Arc<Core>) -> Result<Vec<Entity>, StoreError> {
    let generation = {
        let mut state = core.state.lock().await;
        let generation = core.next_generation();
        state.loading_generation = Some(generation);
        state.last_error = None;
        generation
    };

    let result = with_request_timeout(
        core.options.request_timeout,
        core.adapter.get_all(&core.filter),
    )
    .await;

    let mut state = core.state.lock().await;
    if state.loading_generation == Some(generation) {
        state.loading_generation = None;
    }
    if core.current_generation() != generation {
        // Superseded by a newer fetch, an applied mutation, or a
        // cancel. The previous known-good list stays as is.
        debug!(generation, "sync: discarding stale fetch resolution");
        return Ok(state.visible());
    }

    match result {
        Ok(records) => {
            let mut entities = Vec::with_capacity(records.len());
            let mut seen = HashSet::new();
            for record in records {
                if seen.insert(record.id.clone()) {
                    entities.push(Entity::confirmed(record));
                }
            }
            state.entities = entities;
            let visible = state.visible();
            drop(state);
            if core.offline.mark_online() {
                core.emit(SyncEvent::ConnectivityChanged { is_offline: false });
            }
            core.emit(SyncEvent::EntitiesChanged);
            Ok(visible)
        }
        Err(StoreError::Connectivity(kind)) => {
            // A failed fetch never empties a previously populated
            // list; stale-but-present data plus the offline flag is
            // what consumers render.
            warn!(kind = ?kind, "sync: fetch hit a connectivity failure; serving cached list");
            let visible = state.visible();
            drop(state);
            if core.offline.mark_offline(kind) {
                core.emit(SyncEvent::ConnectivityChanged { is_offline: true });
            }
            Ok(visible)
        }
        Err(err) => {
            // Permission and other non-connectivity failures surface
            // to the caller; the offline flag stays untouched.
            state.last_error = Some(err.to_string());
            drop(state);
            core.emit(SyncEvent::Error(err.to_string()));
            Err(err)
        }
    }
}

/// Reconciliation fetch fired on an offline-to-online transition. Runs
/// detached; failures are reported over the event channel.
pub(crate) fn spawn_reconnect_fetch(core: &Arc<Core>) {
    let weak = Arc::downgrade(core);
    tokio::spawn(async move {
        let Some(core) = weak.upgrade() else {
            return;
        };
        if let Err(err) = run_fetch(&core).await {
            warn!(error = %err, "sync: reconciliation fetch after reconnect failed");
            core.emit(SyncEvent::Error(err.to_string()));
        }
    });
}
