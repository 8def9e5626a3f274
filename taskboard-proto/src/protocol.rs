//! Client/backend wire protocol.
//!
//! Every WebSocket binary frame carries exactly one postcard-encoded
//! [`ClientFrame`] (client → backend) or [`ServerFrame`] (backend → client).
//! Requests are answered in order with a [`ServerFrame::Response`] carrying
//! the same `request_id`; live queries additionally receive
//! [`ServerFrame::Snapshot`] pushes with the full result set.

use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::document::{Document, DocumentId, Fields, Query, StoreError};
use crate::model::UserId;

/// Correlates a response with its request. Chosen by the client.
pub type RequestId = u64;

/// Identifies a live query. Chosen by the client, unique per connection.
pub type SubscriptionId = u64;

/// Operations a client can ask of the backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Register a new account and sign it in on this connection.
    CreateAccount {
        /// Account email.
        email: String,
        /// Account password.
        password: String,
    },
    /// Sign in on this connection.
    SignIn {
        /// Account email.
        email: String,
        /// Account password.
        password: String,
    },
    /// Sign out and drop this connection's live queries.
    SignOut,
    /// Insert a document with a backend-assigned id.
    Create {
        /// Target collection.
        collection: String,
        /// Initial fields.
        fields: Fields,
    },
    /// Merge fields into an existing document.
    Update {
        /// Target collection.
        collection: String,
        /// Document to update.
        id: DocumentId,
        /// Fields to overwrite.
        fields: Fields,
    },
    /// Remove a document; a missing id is not an error.
    Delete {
        /// Target collection.
        collection: String,
        /// Document to remove.
        id: DocumentId,
    },
    /// Run a one-shot equality query.
    Query(Query),
    /// Remove several documents of one collection atomically.
    BatchDelete {
        /// Target collection.
        collection: String,
        /// Documents to remove.
        ids: Vec<DocumentId>,
    },
    /// Start a live query. The initial snapshot arrives as a
    /// [`ServerFrame::Snapshot`] before the response.
    Subscribe {
        /// Client-chosen subscription id.
        subscription_id: SubscriptionId,
        /// Query to keep live.
        query: Query,
    },
    /// Stop a live query.
    Unsubscribe(SubscriptionId),
}

impl std::fmt::Debug for Request {
    // Credentials never reach log output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateAccount { email, .. } => f
                .debug_struct("CreateAccount")
                .field("email", email)
                .finish_non_exhaustive(),
            Self::SignIn { email, .. } => f
                .debug_struct("SignIn")
                .field("email", email)
                .finish_non_exhaustive(),
            Self::SignOut => f.write_str("SignOut"),
            Self::Create { collection, fields } => f
                .debug_struct("Create")
                .field("collection", collection)
                .field("fields", &fields.len())
                .finish(),
            Self::Update {
                collection, id, ..
            } => f
                .debug_struct("Update")
                .field("collection", collection)
                .field("id", id)
                .finish_non_exhaustive(),
            Self::Delete { collection, id } => f
                .debug_struct("Delete")
                .field("collection", collection)
                .field("id", id)
                .finish(),
            Self::Query(query) => f.debug_tuple("Query").field(query).finish(),
            Self::BatchDelete { collection, ids } => f
                .debug_struct("BatchDelete")
                .field("collection", collection)
                .field("ids", &ids.len())
                .finish(),
            Self::Subscribe {
                subscription_id,
                query,
            } => f
                .debug_struct("Subscribe")
                .field("subscription_id", subscription_id)
                .field("query", query)
                .finish(),
            Self::Unsubscribe(id) => f.debug_tuple("Unsubscribe").field(id).finish(),
        }
    }
}

/// Successful outcome of a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Signed in as this user.
    SignedIn(UserId),
    /// The created document.
    Created(Document),
    /// Query results in insertion order.
    Documents(Vec<Document>),
    /// The operation completed with nothing to return.
    Done,
}

/// Failed outcome of a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum Failure {
    /// Identity failure.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A request as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Correlation id echoed in the response.
    pub request_id: RequestId,
    /// The operation.
    pub request: Request,
}

/// A frame sent by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFrame {
    /// Answer to the request with the same id.
    Response {
        /// Id of the request being answered.
        request_id: RequestId,
        /// Outcome of the request.
        result: Result<Reply, Failure>,
    },
    /// Full current result set of a live query.
    Snapshot {
        /// Live query this snapshot belongs to.
        subscription_id: SubscriptionId,
        /// Every matching document, in insertion order.
        documents: Vec<Document>,
    },
}

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes a [`ClientFrame`] using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the frame cannot be serialized.
pub fn encode_client(frame: &ClientFrame) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ClientFrame`] using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes are not a valid frame.
pub fn decode_client(bytes: &[u8]) -> Result<ClientFrame, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`ServerFrame`] using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the frame cannot be serialized.
pub fn encode_server(frame: &ServerFrame) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ServerFrame`] using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes are not a valid frame.
pub fn decode_server(bytes: &[u8]) -> Result<ServerFrame, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldValue;
    use crate::model::{collections, fields};

    #[test]
    fn subscribe_frame_round_trip() {
        let frame = ClientFrame {
            request_id: 7,
            request: Request::Subscribe {
                subscription_id: 3,
                query: Query::collection(collections::TASKS).where_eq(fields::USER_ID, "u1"),
            },
        };
        let bytes = encode_client(&frame).unwrap();
        assert_eq!(decode_client(&bytes).unwrap(), frame);
    }

    #[test]
    fn failure_response_round_trip() {
        let frame = ServerFrame::Response {
            request_id: 9,
            result: Err(Failure::Store(StoreError::NotFound {
                collection: collections::LISTS.to_string(),
                id: DocumentId::new("gone"),
            })),
        };
        let bytes = encode_server(&frame).unwrap();
        assert_eq!(decode_server(&bytes).unwrap(), frame);
    }

    #[test]
    fn snapshot_keeps_document_order() {
        let docs: Vec<Document> = (0..3)
            .map(|i| {
                Document::new(
                    DocumentId::new(format!("d{i}")),
                    Fields::from([("n".to_string(), FieldValue::Integer(i))]),
                )
            })
            .collect();
        let frame = ServerFrame::Snapshot {
            subscription_id: 1,
            documents: docs.clone(),
        };
        let decoded = decode_server(&encode_server(&frame).unwrap()).unwrap();
        let ServerFrame::Snapshot { documents, .. } = decoded else {
            panic!("expected snapshot");
        };
        assert_eq!(documents, docs);
    }

    #[test]
    fn debug_output_hides_password() {
        let request = Request::SignIn {
            email: "ada@example.com".to_string(),
            password: "hunter22".to_string(),
        };
        let rendered = format!("{request:?}");
        assert!(rendered.contains("ada@example.com"));
        assert!(!rendered.contains("hunter22"));
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(decode_client(&[0xFF, 0xFE, 0xFD]).is_err());
        assert!(decode_server(&[]).is_err());
    }
}
