use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

use super::Result;

/// Opaque entity identifier.
///
/// Assigned exactly once when an entity is created and never reused within a
/// session, including after a hard delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity and audit envelope embedded in every stored record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMeta {
    pub id: EntityId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

impl EntityMeta {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            created_at: now,
            updated_at: now,
            deleted: false,
        }
    }

    /// Bump `updated_at`, keeping it monotonic even if the wall clock
    /// stepped backwards.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }
}

impl Default for EntityMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// A record managed by a [`Store`](crate::storage::Store).
///
/// Implementations supply domain validation, the index keys the table
/// maintains for them, and the ordering that list reads present.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Short lowercase name used in log messages.
    fn kind() -> &'static str;

    fn meta(&self) -> &EntityMeta;
    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Canonicalize fields before validation (trim, blank-to-none).
    fn normalize(&mut self) {}

    /// Domain validation. Runs before any insert or update is applied;
    /// a failure leaves the table untouched.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Case-insensitive unique keys as (slot, raw value) pairs. Blank
    /// values must not be reported.
    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Parent reference for hierarchical stores.
    fn parent_id(&self) -> Option<EntityId> {
        None
    }

    /// Derived bucket key for range queries.
    fn bucket_key(&self) -> Option<String> {
        None
    }

    /// Compound uniqueness key; at most one non-deleted entity per value.
    fn combo_key(&self) -> Option<String> {
        None
    }

    /// Ordering used by list reads. Must be a total order.
    fn display_cmp(&self, other: &Self) -> Ordering;

    fn id(&self) -> EntityId {
        self.meta().id
    }

    fn is_deleted(&self) -> bool {
        self.meta().deleted
    }
}

/// ISO-week bucket key for a date, e.g. `2026-W32`.
pub fn week_bucket(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}
