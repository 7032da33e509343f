use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schemaless document fields as they cross the store boundary.
pub type Document = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    const LOCAL_PREFIX: &'static str = "local-";

    /// Synthesizes an id for an entity created while the remote store is
    /// unreachable. Local ids never collide with server-assigned ones.
    pub fn new_local() -> Self {
        Self(format!("{}{}", Self::LOCAL_PREFIX, uuid::Uuid::new_v4()))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(Self::LOCAL_PREFIX)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A confirmed document as returned by a remote store adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: EntityId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fields: Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FilterPredicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }
}

/// Provenance of an entity relative to the remote store.
///
/// Pending variants mark state the remote store has not acknowledged;
/// reconciliation consumes them exhaustively instead of inspecting
/// boolean flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SyncStatus {
    Confirmed,
    PendingCreate,
    PendingUpdate { diff: Document },
    PendingDelete,
}

impl SyncStatus {
    /// Provenance after a local merge the remote store has not seen.
    ///
    /// A pending create stays a pending create (the whole entity is
    /// still unknown remotely); a pending update accumulates the diff.
    pub fn after_local_update(self, partial: &Document) -> SyncStatus {
        match self {
            SyncStatus::Confirmed => SyncStatus::PendingUpdate {
                diff: partial.clone(),
            },
            SyncStatus::PendingCreate => SyncStatus::PendingCreate,
            SyncStatus::PendingUpdate { mut diff } => {
                merge_documents(&mut diff, partial);
                SyncStatus::PendingUpdate { diff }
            }
            SyncStatus::PendingDelete => SyncStatus::PendingDelete,
        }
    }
}

/// A domain-opaque record held in a collection's in-memory list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fields: Document,
    pub status: SyncStatus,
}

impl Entity {
    pub fn confirmed(record: RemoteRecord) -> Self {
        Self {
            id: record.id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            fields: record.fields,
            status: SyncStatus::Confirmed,
        }
    }

    pub fn offline_created(&self) -> bool {
        matches!(self.status, SyncStatus::PendingCreate)
    }

    pub fn offline_updated(&self) -> bool {
        matches!(self.status, SyncStatus::PendingUpdate { .. })
    }

    pub fn offline_deleted(&self) -> bool {
        matches!(self.status, SyncStatus::PendingDelete)
    }

    /// Tombstoned entities are retained internally but excluded from
    /// every read the facade returns.
    pub fn is_visible(&self) -> bool {
        !self.offline_deleted()
    }
}

/// Shallow merge of `partial` into `base`; later keys win.
pub fn merge_documents(base: &mut Document, partial: &Document) {
    for (key, value) in partial {
        base.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn local_ids_are_marked_and_unique() {
        let a = EntityId::new_local();
        let b = EntityId::new_local();
        assert!(a.is_local());
        assert_ne!(a, b);
        assert!(!EntityId::from("srv-1").is_local());
    }

    #[test]
    fn confirmed_entity_becomes_pending_update_with_diff() {
        let partial = doc(&[("name", json!("X"))]);
        let status = SyncStatus::Confirmed.after_local_update(&partial);
        assert_eq!(status, SyncStatus::PendingUpdate { diff: partial });
    }

    #[test]
    fn pending_create_stays_pending_create() {
        let partial = doc(&[("name", json!("X"))]);
        assert_eq!(
            SyncStatus::PendingCreate.after_local_update(&partial),
            SyncStatus::PendingCreate
        );
    }

    #[test]
    fn repeated_offline_updates_accumulate_one_diff() {
        let first = doc(&[("name", json!("X")), ("count", json!(1))]);
        let second = doc(&[("count", json!(2))]);
        let status = SyncStatus::Confirmed
            .after_local_update(&first)
            .after_local_update(&second);
        let expected = doc(&[("name", json!("X")), ("count", json!(2))]);
        assert_eq!(status, SyncStatus::PendingUpdate { diff: expected });
    }
}
