//! Error types for model validation.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while validating or parsing model values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A timestamp string could not be parsed.
    #[error("invalid timestamp: {value:?}")]
    InvalidTimestamp {
        /// The rejected input.
        value: String,
    },

    /// An entity has an empty id.
    #[error("entity has an empty id")]
    EmptyId,

    /// A field required for comparison is missing.
    #[error("entity {id} is missing required field `{field}`")]
    MissingField {
        /// Entity id.
        id: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// The same id appeared twice in one collection.
    #[error("duplicate entity id {id}")]
    DuplicateId {
        /// The repeated id.
        id: String,
    },

    /// A sync state code was not recognised.
    #[error("unknown sync state code {0:?}")]
    UnknownState(String),
}

impl ModelError {
    /// Creates a missing field error.
    pub fn missing_field(id: impl Into<String>, field: &'static str) -> Self {
        Self::MissingField {
            id: id.into(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ModelError::missing_field("abc", "lastUpdated");
        assert_eq!(
            err.to_string(),
            "entity abc is missing required field `lastUpdated`"
        );

        let err = ModelError::UnknownState("LOST".into());
        assert!(err.to_string().contains("LOST"));
    }
}
