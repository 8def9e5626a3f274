//! In-process document store.
//!
//! Keeps collections in memory and fans out live query snapshots
//! synchronously on every write. Used by tests and by embedders that do
//! not need a hosted backend. Failures can be injected per operation with
//! [`MemoryStore::fail_on`] to exercise error paths.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use taskboard_proto::document::{Document, DocumentId, Fields, Query, StoreError};
use taskboard_proto::protocol::SubscriptionId;
use tokio::sync::watch;

use super::{DocumentStore, Snapshot, Subscription, Unsubscribe};

/// Store operations, used to address injected faults and call counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// [`DocumentStore::create`].
    Create,
    /// [`DocumentStore::update`].
    Update,
    /// [`DocumentStore::delete`].
    Delete,
    /// [`DocumentStore::query`].
    Query,
    /// [`DocumentStore::batch_delete`].
    BatchDelete,
    /// [`DocumentStore::subscribe`].
    Subscribe,
}

impl StoreOp {
    const fn is_write(self) -> bool {
        matches!(
            self,
            Self::Create | Self::Update | Self::Delete | Self::BatchDelete
        )
    }
}

struct Watcher {
    query: Query,
    tx: watch::Sender<Snapshot>,
}

#[derive(Default)]
struct State {
    collections: HashMap<String, Vec<Document>>,
    watchers: HashMap<SubscriptionId, Watcher>,
    next_subscription: SubscriptionId,
    faults: HashMap<StoreOp, StoreError>,
    calls: HashMap<StoreOp, usize>,
}

impl State {
    /// Counts the call and returns the injected fault for `op`, if any.
    fn enter(&mut self, op: StoreOp) -> Result<(), StoreError> {
        *self.calls.entry(op).or_default() += 1;
        match self.faults.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn snapshot(&self, query: &Query) -> Snapshot {
        self.collections
            .get(&query.collection)
            .map(|docs| docs.iter().filter(|d| query.matches(d)).cloned().collect())
            .unwrap_or_default()
    }

    fn notify(&mut self, collection: &str, touched: &[Document]) {
        self.watchers.retain(|_, w| !w.tx.is_closed());
        for watcher in self.watchers.values() {
            if watcher.query.collection == collection
                && touched.iter().any(|d| watcher.query.matches(d))
            {
                watcher.tx.send_replace(self.snapshot(&watcher.query));
            }
        }
    }
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
}

impl Unsubscribe for Inner {
    fn unsubscribe(&self, id: SubscriptionId) {
        if self.state.lock().watchers.remove(&id).is_some() {
            tracing::debug!(subscription_id = id, "memory store live query cancelled");
        }
    }
}

/// In-memory [`DocumentStore`]. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `op` fail with `error` until
    /// [`MemoryStore::clear_faults`] is called.
    pub fn fail_on(&self, op: StoreOp, error: StoreError) {
        self.inner.state.lock().faults.insert(op, error);
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        self.inner.state.lock().faults.clear();
    }

    /// Number of calls made to `op`, including failed ones.
    #[must_use]
    pub fn calls(&self, op: StoreOp) -> usize {
        self.inner.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of calls made to any mutating operation.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .calls
            .iter()
            .filter(|(op, _)| op.is_write())
            .map(|(_, n)| n)
            .sum()
    }

    /// Number of live queries currently registered.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.inner.state.lock().watchers.len()
    }

    /// Every document of `collection`, in insertion order.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .state
            .lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, fields: Fields) -> Result<Document, StoreError> {
        let mut state = self.inner.state.lock();
        state.enter(StoreOp::Create)?;
        let doc = Document::new(DocumentId::generate(), fields);
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        state.notify(collection, std::slice::from_ref(&doc));
        Ok(doc)
    }

    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock();
        state.enter(StoreOp::Update)?;
        let doc = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == *id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.clone(),
            })?;
        let before = doc.clone();
        doc.merge(fields);
        let after = doc.clone();
        state.notify(collection, &[before, after]);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock();
        state.enter(StoreOp::Delete)?;
        let removed = state.collections.get_mut(collection).and_then(|docs| {
            docs.iter()
                .position(|d| d.id == *id)
                .map(|index| docs.remove(index))
        });
        if let Some(doc) = removed {
            state.notify(collection, &[doc]);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut state = self.inner.state.lock();
        state.enter(StoreOp::Query)?;
        Ok(state.snapshot(query))
    }

    async fn batch_delete(&self, collection: &str, ids: &[DocumentId]) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock();
        state.enter(StoreOp::BatchDelete)?;
        let targets: HashSet<&DocumentId> = ids.iter().collect();
        let mut removed = Vec::new();
        if let Some(docs) = state.collections.get_mut(collection) {
            docs.retain(|d| {
                if targets.contains(&d.id) {
                    removed.push(d.clone());
                    false
                } else {
                    true
                }
            });
        }
        if !removed.is_empty() {
            state.notify(collection, &removed);
        }
        Ok(())
    }

    async fn subscribe(&self, query: &Query) -> Result<Subscription, StoreError> {
        let mut state = self.inner.state.lock();
        state.enter(StoreOp::Subscribe)?;
        let id = state.next_subscription;
        state.next_subscription += 1;
        let (tx, rx) = watch::channel(state.snapshot(query));
        state.watchers.insert(
            id,
            Watcher {
                query: query.clone(),
                tx,
            },
        );
        drop(state);

        tracing::debug!(subscription_id = id, collection = %query.collection, "memory store live query");
        let cancel: Arc<dyn Unsubscribe> = self.inner.clone();
        Ok(Subscription::new(id, rx, cancel))
    }
}
