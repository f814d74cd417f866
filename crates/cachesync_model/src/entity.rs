//! Identifiable entities.

use crate::error::{ModelError, ModelResult};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// An identifiable record exchanged with the remote source.
///
/// The identity fields (`id`, `name`, `displayName`, `created`,
/// `lastUpdated`) are typed; the remainder of an expanded body is kept
/// verbatim in `fields`. Collection kinds carry their nested items in
/// `items` when the remote body included them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Globally unique id.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Localised name, if the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Creation time assigned by the remote source. Absent for entities
    /// created locally and never pushed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<Timestamp>,
    /// Last modification time on the remote source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
    /// Nested items, for collection kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Entity>>,
    /// Remaining body fields.
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    /// Creates an entity with the given id and name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            display_name: None,
            created: None,
            last_updated: None,
            items: None,
            fields: BTreeMap::new(),
        }
    }

    /// Creates a locally authored entity with a fresh id.
    pub fn new_local(name: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().simple().to_string(), name)
    }

    /// Sets `lastUpdated`.
    #[must_use]
    pub fn with_last_updated(mut self, ts: Timestamp) -> Self {
        self.last_updated = Some(ts);
        self
    }

    /// Sets `created`.
    #[must_use]
    pub fn with_created(mut self, ts: Timestamp) -> Self {
        self.created = Some(ts);
        self
    }

    /// Sets the nested items.
    #[must_use]
    pub fn with_items(mut self, items: Vec<Entity>) -> Self {
        self.items = Some(items);
        self
    }

    /// Sets an extra body field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Returns a copy without nested items.
    ///
    /// Nested items are cached as records of their own, so owners are stored
    /// without them.
    #[must_use]
    pub fn without_items(&self) -> Self {
        Self {
            items: None,
            ..self.clone()
        }
    }

    /// Returns the nested items, or an empty slice.
    #[must_use]
    pub fn nested(&self) -> &[Entity] {
        self.items.as_deref().unwrap_or(&[])
    }

    /// Returns true if the remote source has never acknowledged this entity.
    #[must_use]
    pub fn is_local_only(&self) -> bool {
        self.created.is_none()
    }

    /// Checks that the entity carries the fields needed to diff it.
    pub fn validate(&self) -> ModelResult<Timestamp> {
        if self.id.is_empty() {
            return Err(ModelError::EmptyId);
        }
        self.last_updated
            .ok_or_else(|| ModelError::missing_field(&self.id, "lastUpdated"))
    }
}

/// Indexes entities by id. Later duplicates replace earlier ones.
pub fn to_map(entities: impl IntoIterator<Item = Entity>) -> HashMap<String, Entity> {
    entities.into_iter().map(|e| (e.id.clone(), e)).collect()
}

/// Collects the ids of `entities`, in order.
pub fn to_ids<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> Vec<String> {
    entities.into_iter().map(|e| e.id.clone()).collect()
}
