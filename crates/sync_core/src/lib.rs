//! Offline-aware synchronization layer between UI consumers and a
//! remote document collection.
//!
//! The [`CollectionSync`] facade owns the in-memory entity list and is
//! its only writer; the query and mutation controllers propose changes
//! through it. Connectivity-classified failures flip the collection
//! into offline mode and fall back to optimistic local state tagged
//! with provenance markers for later reconciliation.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use shared::{
    domain::{Document, Entity, EntityId, FilterPredicate, RemoteRecord},
    error::StoreError,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};

pub mod mutation;
pub mod offline;
pub mod query;

pub use mutation::MutationController;
pub use offline::{ConnectivityEvent, OfflineStateTracker};
pub use query::QueryController;

/// Abstract boundary over a schemaless remote document collection.
///
/// Implementations must classify failures structurally through
/// [`StoreError`]; the synchronization layer never inspects error
/// message text. Any transport qualifies (REST, RPC, an embedded
/// document database) as long as these four operations hold.
#[async_trait]
pub trait RemoteStoreAdapter: Send + Sync {
    async fn get_all(&self, filter: &[FilterPredicate]) -> Result<Vec<RemoteRecord>, StoreError>;
    async fn add(&self, fields: &Document) -> Result<RemoteRecord, StoreError>;
    async fn update(&self, id: &EntityId, partial: &Document) -> Result<(), StoreError>;
    async fn remove(&self, id: &EntityId) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// One timeout for fetches and mutations alike.
    pub request_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    EntitiesChanged,
    ConnectivityChanged { is_offline: bool },
    Error(String),
}

/// Point-in-time view handed to (out-of-scope) renderers. Tombstoned
/// entities are already excluded.
#[derive(Debug, Clone)]
pub struct SyncSnapshot {
    pub entities: Vec<Entity>,
    pub is_loading: bool,
    pub is_offline: bool,
    pub error: Option<String>,
}

pub(crate) struct ListState {
    pub(crate) entities: Vec<Entity>,
    /// Generation of the fetch currently allowed to clear the loading
    /// flag; `None` means not loading.
    pub(crate) loading_generation: Option<u64>,
    pub(crate) last_error: Option<String>,
}

impl ListState {
    fn new() -> Self {
        Self {
            entities: Vec::new(),
            loading_generation: None,
            last_error: None,
        }
    }

    pub(crate) fn visible(&self) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|entity| entity.is_visible())
            .cloned()
            .collect()
    }
}

pub(crate) struct Core {
    pub(crate) adapter: Arc<dyn RemoteStoreAdapter>,
    pub(crate) filter: Vec<FilterPredicate>,
    pub(crate) state: Mutex<ListState>,
    pub(crate) offline: OfflineStateTracker,
    /// Monotonic counter guarding stale fetch application. Every new
    /// fetch, every applied mutation, and every cancel bumps it; a
    /// fetch result is applied only if the counter is untouched since
    /// the fetch was issued.
    pub(crate) generation: AtomicU64,
    pub(crate) events: broadcast::Sender<SyncEvent>,
    pub(crate) options: SyncOptions,
}

impl Core {
    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }
}

pub(crate) async fn with_request_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::timeout()),
    }
}

/// Composed surface over one remote collection:
/// `{entities, is_loading, is_offline, error, fetch_all, add, update,
/// remove, cancel}`.
pub struct CollectionSync {
    core: Arc<Core>,
    query: QueryController,
    mutations: MutationController,
}

impl CollectionSync {
    pub fn new(adapter: Arc<dyn RemoteStoreAdapter>, options: SyncOptions) -> Self {
        Self::with_filter(adapter, Vec::new(), options)
    }

    pub fn with_filter(
        adapter: Arc<dyn RemoteStoreAdapter>,
        filter: Vec<FilterPredicate>,
        options: SyncOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity);
        let core = Arc::new(Core {
            adapter,
            filter,
            state: Mutex::new(ListState::new()),
            offline: OfflineStateTracker::new(),
            generation: AtomicU64::new(0),
            events,
            options,
        });
        Self {
            query: QueryController::new(Arc::clone(&core)),
            mutations: MutationController::new(Arc::clone(&core)),
            core,
        }
    }

    pub async fn snapshot(&self) -> SyncSnapshot {
        let state = self.core.state.lock().await;
        SyncSnapshot {
            entities: state.visible(),
            is_loading: state.loading_generation.is_some(),
            is_offline: self.core.offline.is_offline(),
            error: state.last_error.clone(),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.core.offline.is_offline()
    }

    pub async fn fetch_all(&self) -> Result<Vec<Entity>, StoreError> {
        self.query.fetch_all().await
    }

    pub async fn cancel(&self) {
        self.query.cancel().await;
    }

    pub async fn add(&self, fields: Document) -> Result<Entity, StoreError> {
        self.mutations.add(fields).await
    }

    pub async fn update(&self, id: &EntityId, partial: Document) -> Result<Entity, StoreError> {
        self.mutations.update(id, partial).await
    }

    pub async fn remove(&self, id: &EntityId) -> Result<(), StoreError> {
        self.mutations.remove(id).await
    }

    /// Fixture helper for tests and demos; not part of the production
    /// contract. Each seeded record goes through the regular `add`
    /// path and keeps its success/offline semantics.
    pub async fn seed_mock_entities(&self, count: usize) -> Result<Vec<Entity>, StoreError> {
        self.mutations.seed_mock_entities(count).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.core.events.subscribe()
    }

    pub fn query(&self) -> &QueryController {
        &self.query
    }

    pub fn mutations(&self) -> &MutationController {
        &self.mutations
    }

    /// Wires a platform online/offline event stream into the tracker.
    /// The listener holds the facade weakly and stops once the facade
    /// is dropped, so no state mutation survives teardown.
    pub fn attach_connectivity_signal(
        &self,
        receiver: broadcast::Receiver<ConnectivityEvent>,
    ) -> JoinHandle<()> {
        offline::spawn_signal_listener(Arc::downgrade(&self.core), receiver)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
