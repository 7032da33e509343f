use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::EntityId;

/// Structural cause of a connectivity-classified failure.
///
/// Timeouts stay a distinct subtype so observability does not collapse
/// them into generic unreachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityKind {
    Unreachable,
    Timeout,
    KnownOffline,
}

/// Failure taxonomy at the remote store boundary.
///
/// Adapters must classify structurally; matching on error message text
/// is not an accepted classification source. Only `Connectivity` is
/// ever intercepted for optimistic fallback, every other kind reaches
/// the caller verbatim.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote store connectivity failure: {0:?}")]
    Connectivity(ConnectivityKind),
    #[error("no entity with id {0}")]
    NotFound(EntityId),
    #[error("remote store rejected the request: {0}")]
    Validation(String),
    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl StoreError {
    pub fn unreachable() -> Self {
        Self::Connectivity(ConnectivityKind::Unreachable)
    }

    pub fn timeout() -> Self {
        Self::Connectivity(ConnectivityKind::Timeout)
    }

    pub fn known_offline() -> Self {
        Self::Connectivity(ConnectivityKind::KnownOffline)
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }

    pub fn connectivity_kind(&self) -> Option<ConnectivityKind> {
        match self {
            Self::Connectivity(kind) => Some(*kind),
            _ => None,
        }
    }
}
