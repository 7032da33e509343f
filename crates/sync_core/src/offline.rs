use std::sync::Weak;

use shared::error::ConnectivityKind;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{query, Core, SyncEvent};

/// Platform online/offline transition. The signal source is an
/// external collaborator; this layer only consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

/// The single offline/online flag consumed by both controllers.
pub struct OfflineStateTracker {
    state: watch::Sender<bool>,
}

impl OfflineStateTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self { state }
    }

    pub fn is_offline(&self) -> bool {
        *self.state.borrow()
    }

    /// Returns whether this call performed the transition; repeated
    /// calls while already offline are no-ops.
    pub fn mark_offline(&self, kind: ConnectivityKind) -> bool {
        let transitioned = self.state.send_if_modified(|offline| {
            if *offline {
                false
            } else {
                *offline = true;
                true
            }
        });
        if transitioned {
            warn!(kind = ?kind, "sync: entering offline mode");
        }
        transitioned
    }

    /// Returns whether this call performed the transition. Rapid
    /// repeated online signals collapse into one transition, which is
    /// what keeps the reconnect fetch deduplicated.
    pub fn mark_online(&self) -> bool {
        let transitioned = self.state.send_if_modified(|offline| {
            if *offline {
                *offline = false;
                true
            } else {
                false
            }
        });
        if transitioned {
            info!("sync: back online");
        }
        transitioned
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for OfflineStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Feeds platform connectivity events into the tracker. Holds the core
/// weakly so the listener dies with the facade and cannot mutate state
/// after teardown. An offline-to-online transition triggers exactly
/// one reconciliation fetch; queued offline mutations are not replayed.
pub(crate) fn spawn_signal_listener(
    core: Weak<Core>,
    mut receiver: broadcast::Receiver<ConnectivityEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "sync: connectivity signal lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(core) = core.upgrade() else {
                break;
            };
            match event {
                ConnectivityEvent::Offline => {
                    if core.offline.mark_offline(ConnectivityKind::KnownOffline) {
                        core.emit(SyncEvent::ConnectivityChanged { is_offline: true });
                    }
                }
                ConnectivityEvent::Online => {
                    if core.offline.mark_online() {
                        core.emit(SyncEvent::ConnectivityChanged { is_offline: false });
                        query::spawn_reconnect_fetch(&core);
                    }
                }
            }
        }
    })
}
