//! Entity kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of an entity type, e.g. `dashboards` or `categoryCombos`.
///
/// The name doubles as the remote collection path segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(String);

impl EntityKind {
    /// Creates a kind from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the kind name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The nested side of an owning kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NestedSpec {
    /// Kind of the nested items.
    pub kind: EntityKind,
    /// Field of the owner's remote body that carries the items.
    pub field: String,
}

/// Describes a tracked kind and, for collection kinds, its nested kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KindSpec {
    kind: EntityKind,
    nested: Option<NestedSpec>,
}

impl KindSpec {
    /// A kind without nested items.
    pub fn flat(kind: impl Into<EntityKind>) -> Self {
        Self {
            kind: kind.into(),
            nested: None,
        }
    }

    /// A collection kind owning items of `nested_kind`, carried remotely in `field`.
    pub fn owning(
        kind: impl Into<EntityKind>,
        nested_kind: impl Into<EntityKind>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            nested: Some(NestedSpec {
                kind: nested_kind.into(),
                field: field.into(),
            }),
        }
    }

    /// Returns the kind.
    #[must_use]
    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// Returns the nested spec, if this is a collection kind.
    #[must_use]
    pub fn nested(&self) -> Option<&NestedSpec> {
        self.nested.as_ref()
    }

    /// Returns true if entities of this kind own nested items.
    #[must_use]
    pub fn is_owning(&self) -> bool {
        self.nested.is_some()
    }
}
