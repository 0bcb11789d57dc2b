//! Error types for serialization operations.

use thiserror::Error;

use crate::serialization::portable::FieldType;

/// The main error type for serialization operations.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// A read, write or seek fell outside the buffer.
    #[error("out of bounds: position {position}, requested {requested} bytes, limit {limit}")]
    OutOfBounds {
        /// Cursor or explicit position of the access.
        position: usize,
        /// Number of bytes the access needed.
        requested: usize,
        /// Size of the readable/writable region.
        limit: usize,
    },

    /// Invalid class definition (duplicate field names, invalid nested reference).
    #[error("schema error: {0}")]
    Schema(String),

    /// A structurally different class definition is already registered for the key.
    #[error(
        "conflicting class definition for factory_id={factory_id}, class_id={class_id}, version={version}"
    )]
    ClassDefinitionConflict {
        /// Factory ID of the conflicting definition.
        factory_id: i32,
        /// Class ID of the conflicting definition.
        class_id: i32,
        /// Version of the conflicting definition.
        version: i32,
    },

    /// Reader/writer calls made in an order the protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A field was accessed with a type its definition does not allow.
    #[error("incompatible field '{field}': declared {declared:?}, requested {requested:?}")]
    IncompatibleField {
        /// Field name.
        field: String,
        /// Type recorded in the class definition.
        declared: FieldType,
        /// Type of the accessor that was called.
        requested: FieldType,
    },

    /// No class definition is registered and none can be derived from the data.
    #[error(
        "unknown class definition: factory_id={factory_id}, class_id={class_id}, version={version}"
    )]
    UnknownClassDefinition {
        /// Factory ID from the stream.
        factory_id: i32,
        /// Class ID from the stream.
        class_id: i32,
        /// Version from the stream.
        version: i32,
    },

    /// No factory can create an instance for the given identifiers.
    #[error("no portable factory for factory_id={factory_id}, class_id={class_id}")]
    UnknownFactory {
        /// Factory ID from the stream.
        factory_id: i32,
        /// Class ID from the stream.
        class_id: i32,
    },

    /// A resource (buffer pool, service) was used after being torn down.
    #[error("not available: {0}")]
    Unavailable(String),

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed data (invalid UTF-8, unknown type ids, negative lengths).
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SerializationError {
    pub(crate) fn out_of_bounds(position: usize, requested: usize, limit: usize) -> Self {
        Self::OutOfBounds {
            position,
            requested,
            limit,
        }
    }

    pub(crate) fn incompatible(field: &str, declared: FieldType, requested: FieldType) -> Self {
        Self::IncompatibleField {
            field: field.to_string(),
            declared,
            requested,
        }
    }

    /// Returns true if the error was caused by a missing schema the caller could
    /// fetch from elsewhere and retry with.
    pub fn is_unknown_schema(&self) -> bool {
        matches!(
            self,
            Self::UnknownClassDefinition { .. } | Self::UnknownFactory { .. }
        )
    }
}

/// A specialized `Result` type for serialization operations.
pub type Result<T> = std::result::Result<T, SerializationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_bounds_display() {
        let err = SerializationError::out_of_bounds(6, 4, 8);
        assert_eq!(
            err.to_string(),
            "out of bounds: position 6, requested 4 bytes, limit 8"
        );
    }

    #[test]
    fn test_schema_error_display() {
        let err = SerializationError::Schema("duplicate field name 'age'".to_string());
        assert_eq!(err.to_string(), "schema error: duplicate field name 'age'");
    }

    #[test]
    fn test_conflict_display() {
        let err = SerializationError::ClassDefinitionConflict {
            factory_id: 1,
            class_id: 2,
            version: 3,
        };
        assert_eq!(
            err.to_string(),
            "conflicting class definition for factory_id=1, class_id=2, version=3"
        );
    }

    #[test]
    fn test_incompatible_field_display() {
        let err = SerializationError::incompatible("name", FieldType::Utf, FieldType::Int);
        assert_eq!(
            err.to_string(),
            "incompatible field 'name': declared Utf, requested Int"
        );
    }

    #[test]
    fn test_unknown_schema_classification() {
        let unknown = SerializationError::UnknownClassDefinition {
            factory_id: 1,
            class_id: 1,
            version: 2,
        };
        assert!(unknown.is_unknown_schema());

        let factory = SerializationError::UnknownFactory {
            factory_id: 1,
            class_id: 9,
        };
        assert!(factory.is_unknown_schema());

        let protocol = SerializationError::Protocol("raw data already read".to_string());
        assert!(!protocol.is_unknown_schema());
    }

    #[test]
    fn test_unavailable_display() {
        let err = SerializationError::Unavailable("buffer pool disposed".to_string());
        assert_eq!(err.to_string(), "not available: buffer pool disposed");
    }

    // Exhaustive on purpose: every variant belongs to one failure class.
    fn failure_class(err: &SerializationError) -> &'static str {
        match err {
            SerializationError::OutOfBounds { .. } => "bounds",
            SerializationError::Schema(_) | SerializationError::ClassDefinitionConflict { .. } => {
                "schema"
            }
            SerializationError::Protocol(_) => "protocol",
            SerializationError::IncompatibleField { .. } => "type",
            SerializationError::UnknownClassDefinition { .. }
            | SerializationError::UnknownFactory { .. } => "unknown schema",
            SerializationError::Unavailable(_) => "lifecycle",
            SerializationError::Configuration(_) => "configuration",
            SerializationError::Serialization(_) => "malformed",
        }
    }

    #[test]
    fn test_every_variant_has_a_failure_class() {
        assert_eq!(failure_class(&SerializationError::out_of_bounds(0, 1, 0)), "bounds");
        assert_eq!(
            failure_class(&SerializationError::Unavailable("disposed".to_string())),
            "lifecycle"
        );
        assert_eq!(
            failure_class(&SerializationError::Serialization("bad utf-8".to_string())),
            "malformed"
        );
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SerializationError>();
    }
}
