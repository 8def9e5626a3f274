//! Schemaless documents, equality queries, and the store error taxonomy.
//!
//! The backend keeps every record as a [`Document`]: a store-assigned
//! [`DocumentId`] plus a flat map of named [`FieldValue`]s. Typed entities
//! (lists, tasks) are normalized from documents in [`crate::model`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store-assigned document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh, time-ordered identifier (UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single field value. The store is schemaless, so every field carries
/// its own type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Explicit null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Integer(i64),
    /// UTF-8 text value.
    Text(String),
}

impl FieldValue {
    /// Returns the text content, or `None` for non-text values.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Text(_) => "text",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Named fields of a document, ordered by name.
pub type Fields = BTreeMap<String, FieldValue>;

/// A stored record: identifier plus schemaless fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned identifier.
    pub id: DocumentId,
    /// Field values keyed by field name.
    pub fields: Fields,
}

impl Document {
    /// Creates a document from an id and its fields.
    #[must_use]
    pub const fn new(id: DocumentId, fields: Fields) -> Self {
        Self { id, fields }
    }

    /// Returns the value of `field`, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Returns the text value of a required field.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::MissingField`] if the field is absent, or
    /// [`DocumentError::WrongType`] if it is not text.
    pub fn text(&self, field: &'static str) -> Result<&str, DocumentError> {
        match self.fields.get(field) {
            Some(FieldValue::Text(s)) => Ok(s),
            Some(other) => Err(DocumentError::WrongType {
                id: self.id.clone(),
                field,
                found: other.type_name(),
            }),
            None => Err(DocumentError::MissingField {
                id: self.id.clone(),
                field,
            }),
        }
    }

    /// Overwrites the given fields, leaving all others untouched.
    pub fn merge(&mut self, fields: Fields) {
        self.fields.extend(fields);
    }
}

/// Errors raised while normalizing a document into a typed entity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// A required field is absent.
    #[error("document {id} is missing field `{field}`")]
    MissingField {
        /// Offending document.
        id: DocumentId,
        /// Name of the missing field.
        field: &'static str,
    },
    /// A field holds a value of the wrong type.
    #[error("document {id} field `{field}` should be text, found {found}")]
    WrongType {
        /// Offending document.
        id: DocumentId,
        /// Name of the field.
        field: &'static str,
        /// Type that was found instead.
        found: &'static str,
    },
    /// A field holds text that does not parse.
    #[error("document {id} field `{field}` has invalid value {value:?}")]
    InvalidValue {
        /// Offending document.
        id: DocumentId,
        /// Name of the field.
        field: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// One equality constraint of a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Field name to compare.
    pub field: String,
    /// Value the field must equal.
    pub value: FieldValue,
}

/// A collection-scoped query: every filter must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Collection to search.
    pub collection: String,
    /// Conjunction of equality filters.
    pub filters: Vec<Filter>,
}

impl Query {
    /// Creates a query matching every document in `collection`.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
        }
    }

    /// Adds a `field == value` constraint.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Returns `true` if the document satisfies every filter.
    ///
    /// Collection membership is the caller's concern; only fields are checked.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|f| doc.fields.get(&f.field) == Some(&f.value))
    }
}

/// Errors reported by a document store.
///
/// Shared between the client and the backend so failures cross the wire
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum StoreError {
    /// The addressed document does not exist.
    #[error("document {id} not found in `{collection}`")]
    NotFound {
        /// Collection that was searched.
        collection: String,
        /// Missing document id.
        id: DocumentId,
    },
    /// The signed-in user may not touch the addressed document.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The operation requires a signed-in user.
    #[error("not signed in")]
    NotSignedIn,
    /// A per-session limit was exceeded.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The backend did not answer in time.
    #[error("store request timed out")]
    Timeout,
    /// A frame could not be encoded or decoded, or the reply was unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),
}
