//! Client-side error taxonomy.
//!
//! [`BoardError`] is what every user-initiated operation returns. It wraps
//! the four failure kinds a user can run into and renders each as a short
//! notification via [`BoardError::user_message`].

use taskboard_proto::auth::AuthError;
use taskboard_proto::document::StoreError;
use taskboard_proto::model::{ColumnParseError, ListId};

/// Input rejected before any store call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// List name is empty after trimming.
    #[error("list name must not be empty")]
    EmptyListName,
    /// A required task field is empty after trimming.
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    /// The due date is not a `YYYY-MM-DD` calendar date.
    #[error("due date {0:?} is not a YYYY-MM-DD date")]
    InvalidDueDate(String),
    /// The target list is not one of the user's lists.
    #[error("unknown list {0}")]
    UnknownList(ListId),
    /// A column id from the view could not be parsed.
    #[error(transparent)]
    Column(#[from] ColumnParseError),
}

/// Failure of a user-initiated board operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// Input was rejected locally.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Sign-up, sign-in or sign-out failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// A store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Deleting a list and its tasks did not complete. Retrying the whole
    /// delete is safe.
    #[error("failed to delete list {list_id}: {source}")]
    Delete {
        /// List whose deletion failed.
        list_id: ListId,
        /// Store failure that interrupted the cascade.
        source: StoreError,
    },
}

impl BoardError {
    /// Short text suitable for a user-facing notification.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::Auth(AuthError::Backend(_)) => {
                "Could not reach the sign-in service. Please try again.".to_string()
            }
            Self::Auth(e) => e.to_string(),
            Self::Store(StoreError::NotSignedIn) => "Please log in first.".to_string(),
            Self::Store(StoreError::PermissionDenied(_)) => {
                "You do not have access to that item.".to_string()
            }
            Self::Store(_) => "Something went wrong. Please try again.".to_string(),
            Self::Delete { .. } => {
                "The list could not be fully deleted. Please try again.".to_string()
            }
        }
    }
}
