//! Document store abstraction.
//!
//! Defines the [`DocumentStore`] trait the list/task adapter is written
//! against, and the [`Subscription`] type every live query returns.
//! Concrete implementations:
//! - [`memory::MemoryStore`]: in-process store for tests and embedding
//! - [`crate::remote::RemoteBackend`]: the hosted backend over WebSocket

pub mod memory;

use std::sync::Arc;

use taskboard_proto::document::{Document, DocumentId, Fields, Query, StoreError};
use taskboard_proto::protocol::SubscriptionId;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Full result set of a live query at one point in time.
pub type Snapshot = Vec<Document>;

/// Async, collection-scoped document store.
///
/// Every method is one round trip to the store. Implementations must keep
/// query results in insertion order.
pub trait DocumentStore: Send + Sync + 'static {
    /// Inserts a document and returns it with its store-assigned id.
    fn create(
        &self,
        collection: &str,
        fields: Fields,
    ) -> impl std::future::Future<Output = Result<Document, StoreError>> + Send;

    /// Overwrites the given fields of an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Removes a document. Removing a missing document is not an error.
    fn delete(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Returns every document matching `query`.
    fn query(
        &self,
        query: &Query,
    ) -> impl std::future::Future<Output = Result<Vec<Document>, StoreError>> + Send;

    /// Removes several documents of one collection atomically.
    fn batch_delete(
        &self,
        collection: &str,
        ids: &[DocumentId],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Starts a live query. The returned subscription already holds the
    /// initial snapshot.
    fn subscribe(
        &self,
        query: &Query,
    ) -> impl std::future::Future<Output = Result<Subscription, StoreError>> + Send;
}

/// Cancels a live query on the store side.
pub trait Unsubscribe: Send + Sync {
    /// Stops pushing snapshots for subscription `id`. Idempotent.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// A live query: the latest snapshot plus a way to cancel it.
///
/// Consumers pick a binding: pull with [`Subscription::changed`], or push
/// with [`Subscription::on_change`]. Dropping a subscription cancels it.
pub struct Subscription {
    id: SubscriptionId,
    rx: watch::Receiver<Snapshot>,
    cancel: Option<Arc<dyn Unsubscribe>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Wraps a snapshot receiver and the hook that cancels it.
    #[must_use]
    pub fn new(
        id: SubscriptionId,
        rx: watch::Receiver<Snapshot>,
        cancel: Arc<dyn Unsubscribe>,
    ) -> Self {
        Self {
            id,
            rx,
            cancel: Some(cancel),
        }
    }

    /// Store-side identifier of this live query.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The most recent snapshot.
    #[must_use]
    pub fn current(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` once the store stops delivering, either because the
    /// live query was cancelled or the connection was lost.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Switches to the push binding: `callback` runs with the current
    /// snapshot right away, then with every later one.
    ///
    /// Must be called within a Tokio runtime.
    pub fn on_change<F>(mut self, mut callback: F) -> SubscriptionHandle
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        let mut rx = self.rx.clone();
        let task = tokio::spawn(async move {
            let first = rx.borrow_and_update().clone();
            callback(first);
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                callback(snapshot);
            }
        });
        SubscriptionHandle {
            id: self.id,
            cancel: self.cancel.take(),
            task: Some(task),
        }
    }

    /// Cancels the live query.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.unsubscribe(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

/// Handle to a push-bound live query. Dropping it unsubscribes.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    cancel: Option<Arc<dyn Unsubscribe>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl SubscriptionHandle {
    /// Store-side identifier of this live query.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns `true` while snapshots are still being delivered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancels the live query and stops the callback.
    pub fn unsubscribe(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.unsubscribe(self.id);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;
    use taskboard_proto::document::DocumentId;

    #[derive(Default)]
    struct Recorder {
        cancelled: Mutex<Vec<SubscriptionId>>,
    }

    impl Unsubscribe for Recorder {
        fn unsubscribe(&self, id: SubscriptionId) {
            self.cancelled.lock().push(id);
        }
    }

    fn doc(id: &str) -> Document {
        Document::new(DocumentId::new(id), Fields::new())
    }

    #[tokio::test]
    async fn pull_binding_sees_latest_snapshot() {
        let recorder = Arc::new(Recorder::default());
        let (tx, rx) = watch::channel(vec![doc("a")]);
        let mut sub = Subscription::new(1, rx, recorder.clone());
        assert_eq!(sub.current(), vec![doc("a")]);

        tx.send_replace(vec![doc("a"), doc("b")]);
        assert_eq!(sub.changed().await, Some(vec![doc("a"), doc("b")]));

        drop(tx);
        assert_eq!(sub.changed().await, None);
    }

    #[tokio::test]
    async fn drop_cancels_exactly_once() {
        let recorder = Arc::new(Recorder::default());
        let (_tx, rx) = watch::channel(Vec::new());
        let sub = Subscription::new(7, rx, recorder.clone());
        sub.unsubscribe();
        assert_eq!(*recorder.cancelled.lock(), vec![7]);
    }

    #[tokio::test]
    async fn push_binding_delivers_initial_then_updates() {
        let recorder = Arc::new(Recorder::default());
        let (tx, rx) = watch::channel(vec![doc("a")]);
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = Subscription::new(3, rx, recorder.clone()).on_change(move |snapshot| {
            let _ = seen_tx.send(snapshot.len());
        });

        assert_eq!(seen_rx.recv().await, Some(1));
        tx.send_replace(vec![doc("a"), doc("b")]);
        assert_eq!(seen_rx.recv().await, Some(2));
        assert!(handle.is_active());
        // Switching bindings must not cancel the live query.
        assert!(recorder.cancelled.lock().is_empty());

        drop(handle);
        assert_eq!(*recorder.cancelled.lock(), vec![3]);
        tx.send_replace(Vec::new());
        let next = tokio::time::timeout(Duration::from_millis(50), seen_rx.recv()).await;
        assert!(matches!(next, Ok(None) | Err(_)));
    }
}
