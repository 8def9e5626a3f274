//! In-memory document database with live query fan-out.
//!
//! Collections keep documents in insertion order, which is the order every
//! query and snapshot reports them in. Documents carrying a `userId` field
//! are private to that user: other users neither see them in results nor
//! may write them. Documents without an owner are visible to everyone.
//!
//! Live queries ("watchers") are registered per connection. After every
//! write, each watcher whose query matched a touched document (before or
//! after the write) receives the full recomputed result set.

use std::collections::{HashMap, HashSet};

use taskboard_proto::document::{Document, DocumentId, FieldValue, Fields, Query, StoreError};
use taskboard_proto::model::{UserId, fields};
use taskboard_proto::protocol::{ServerFrame, SubscriptionId};
use tokio::sync::{RwLock, mpsc};

/// Identifies one client connection.
pub type SessionId = u64;

/// Default cap on live queries a single connection may hold.
const DEFAULT_MAX_WATCHERS_PER_SESSION: usize = 64;

struct Watcher {
    session: SessionId,
    subscription_id: SubscriptionId,
    viewer: UserId,
    query: Query,
    sink: mpsc::UnboundedSender<ServerFrame>,
}

#[derive(Default)]
struct DbState {
    collections: HashMap<String, Vec<Document>>,
    watchers: Vec<Watcher>,
}

impl DbState {
    /// Pushes fresh snapshots to watchers affected by `touched`, dropping
    /// watchers whose connection has gone away.
    fn notify(&mut self, collection: &str, touched: &[Document]) {
        let collections = &self.collections;
        self.watchers.retain(|w| {
            if w.query.collection != collection {
                return true;
            }
            let affected = touched
                .iter()
                .any(|d| readable(d, &w.viewer) && w.query.matches(d));
            if !affected {
                return true;
            }
            let documents = snapshot(collections, &w.query, &w.viewer);
            tracing::trace!(
                session = w.session,
                subscription_id = w.subscription_id,
                count = documents.len(),
                "pushing snapshot"
            );
            w.sink
                .send(ServerFrame::Snapshot {
                    subscription_id: w.subscription_id,
                    documents,
                })
                .is_ok()
        });
    }
}

/// Document database shared by all connections.
///
/// Thread-safe via [`RwLock`]; writes and watcher notification happen under
/// one write lock, so every watcher observes snapshots in write order.
pub struct DocumentDb {
    state: RwLock<DbState>,
    max_watchers_per_session: usize,
}

impl Default for DocumentDb {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentDb {
    /// Creates an empty database with the default watcher limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_watchers(DEFAULT_MAX_WATCHERS_PER_SESSION)
    }

    /// Creates an empty database with a custom per-connection watcher limit.
    #[must_use]
    pub fn with_max_watchers(max_watchers_per_session: usize) -> Self {
        Self {
            state: RwLock::new(DbState::default()),
            max_watchers_per_session,
        }
    }

    /// Inserts a document with a fresh id and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PermissionDenied`] if `fields` names another
    /// user as owner.
    pub async fn create(
        &self,
        viewer: &UserId,
        collection: &str,
        fields: Fields,
    ) -> Result<Document, StoreError> {
        check_owner_field(viewer, &fields)?;
        let doc = Document::new(DocumentId::generate(), fields);

        let mut state = self.state.write().await;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        state.notify(collection, std::slice::from_ref(&doc));
        drop(state);

        tracing::debug!(collection, id = %doc.id, "document created");
        Ok(doc)
    }

    /// Merges `fields` into an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the document does not exist, or
    /// [`StoreError::PermissionDenied`] if it belongs to another user or
    /// the update would hand it to another user.
    pub async fn update(
        &self,
        viewer: &UserId,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), StoreError> {
        check_owner_field(viewer, &fields)?;

        let mut state = self.state.write().await;
        let doc = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == *id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.clone(),
            })?;
        ensure_writable(viewer, doc)?;
        let before = doc.clone();
        doc.merge(fields);
        let after = doc.clone();
        state.notify(collection, &[before, after]);
        drop(state);

        tracing::debug!(collection, id = %id, "document updated");
        Ok(())
    }

    /// Removes a document. Removing a missing document succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PermissionDenied`] if the document belongs to
    /// another user.
    pub async fn delete(
        &self,
        viewer: &UserId,
        collection: &str,
        id: &DocumentId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let Some(docs) = state.collections.get_mut(collection) else {
            return Ok(());
        };
        let Some(index) = docs.iter().position(|d| d.id == *id) else {
            return Ok(());
        };
        ensure_writable(viewer, &docs[index])?;
        let removed = docs.remove(index);
        state.notify(collection, std::slice::from_ref(&removed));
        drop(state);

        tracing::debug!(collection, id = %id, "document deleted");
        Ok(())
    }

    /// Removes several documents of one collection as a unit.
    ///
    /// Permission is checked for every document before any is removed, so
    /// either all existing documents go or none do. Missing ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PermissionDenied`] if any document belongs to
    /// another user.
    pub async fn batch_delete(
        &self,
        viewer: &UserId,
        collection: &str,
        ids: &[DocumentId],
    ) -> Result<(), StoreError> {
        let targets: HashSet<&DocumentId> = ids.iter().collect();

        let mut state = self.state.write().await;
        let Some(docs) = state.collections.get_mut(collection) else {
            return Ok(());
        };
        for doc in docs.iter().filter(|d| targets.contains(&d.id)) {
            ensure_writable(viewer, doc)?;
        }
        let mut removed = Vec::new();
        docs.retain(|d| {
            if targets.contains(&d.id) {
                removed.push(d.clone());
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            state.notify(collection, &removed);
        }
        drop(state);

        tracing::debug!(collection, count = removed.len(), "batch delete committed");
        Ok(())
    }

    /// Returns the documents matching `query` that `viewer` may read.
    pub async fn query(&self, viewer: &UserId, query: &Query) -> Vec<Document> {
        let state = self.state.read().await;
        snapshot(&state.collections, query, viewer)
    }

    /// Registers a live query and pushes its initial snapshot to `sink`.
    ///
    /// The initial snapshot is sent before this returns, so it precedes
    /// any later push for the same subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ResourceExhausted`] if the session already
    /// holds the maximum number of watchers, or [`StoreError::Protocol`]
    /// if the subscription id is already in use on this session.
    pub async fn watch(
        &self,
        session: SessionId,
        viewer: &UserId,
        subscription_id: SubscriptionId,
        query: Query,
        sink: mpsc::UnboundedSender<ServerFrame>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let mut held = 0;
        for w in state.watchers.iter().filter(|w| w.session == session) {
            if w.subscription_id == subscription_id {
                return Err(StoreError::Protocol(format!(
                    "subscription id {subscription_id} already in use"
                )));
            }
            held += 1;
        }
        if held >= self.max_watchers_per_session {
            return Err(StoreError::ResourceExhausted(format!(
                "at most {} live queries per connection",
                self.max_watchers_per_session
            )));
        }

        let documents = snapshot(&state.collections, &query, viewer);
        let _ = sink.send(ServerFrame::Snapshot {
            subscription_id,
            documents,
        });
        state.watchers.push(Watcher {
            session,
            subscription_id,
            viewer: viewer.clone(),
            query,
            sink,
        });
        drop(state);

        tracing::debug!(session, subscription_id, "live query registered");
        Ok(())
    }

    /// Removes one live query. Returns `true` if it existed.
    pub async fn unwatch(&self, session: SessionId, subscription_id: SubscriptionId) -> bool {
        let mut state = self.state.write().await;
        let before = state.watchers.len();
        state
            .watchers
            .retain(|w| !(w.session == session && w.subscription_id == subscription_id));
        before != state.watchers.len()
    }

    /// Removes every live query of a session, returning how many were held.
    pub async fn unwatch_session(&self, session: SessionId) -> usize {
        let mut state = self.state.write().await;
        let before = state.watchers.len();
        state.watchers.retain(|w| w.session != session);
        before - state.watchers.len()
    }

    /// Number of live queries currently held by a session.
    pub async fn watcher_count(&self, session: SessionId) -> usize {
        let state = self.state.read().await;
        state.watchers.iter().filter(|w| w.session == session).count()
    }
}

/// A document is readable when it has no owner or is owned by `viewer`.
fn readable(doc: &Document, viewer: &UserId) -> bool {
    match doc.get(fields::USER_ID) {
        None => true,
        Some(FieldValue::Text(owner)) => owner == viewer.as_str(),
        Some(_) => false,
    }
}

fn ensure_writable(viewer: &UserId, doc: &Document) -> Result<(), StoreError> {
    if readable(doc, viewer) {
        Ok(())
    } else {
        Err(StoreError::PermissionDenied(format!(
            "document {} belongs to another user",
            doc.id
        )))
    }
}

fn check_owner_field(viewer: &UserId, fields: &Fields) -> Result<(), StoreError> {
    match fields.get(fields::USER_ID) {
        None => Ok(()),
        Some(FieldValue::Text(owner)) if owner == viewer.as_str() => Ok(()),
        Some(_) => Err(StoreError::PermissionDenied(
            "documents may only be owned by the signed-in user".to_string(),
        )),
    }
}

fn snapshot(
    collections: &HashMap<String, Vec<Document>>,
    query: &Query,
    viewer: &UserId,
) -> Vec<Document> {
    collections
        .get(&query.collection)
        .map(|docs| {
            docs.iter()
                .filter(|d| readable(d, viewer) && query.matches(d))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}
