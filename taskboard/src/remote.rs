//! WebSocket client for the hosted Taskboard backend.
//!
//! [`RemoteBackend`] holds one WebSocket connection to `taskboard-server`
//! and implements both [`DocumentStore`] and [`IdentityProvider`] over it.
//! Requests carry a client-chosen id and are matched to responses through a
//! table of pending `oneshot` senders. Live query snapshots are routed by
//! subscription id to the matching `watch` sender.
//!
//! When the connection drops, every pending request fails with
//! [`StoreError::Unavailable`], every subscription stops delivering, and the
//! signed-in user is cleared. Nothing reconnects automatically.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use taskboard_proto::auth::AuthError;
use taskboard_proto::document::{Document, DocumentId, Fields, Query, StoreError};
use taskboard_proto::model::UserId;
use taskboard_proto::protocol::{
    self, ClientFrame, Failure, Reply, Request, RequestId, ServerFrame, SubscriptionId,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::identity::IdentityProvider;
use crate::store::{DocumentStore, Snapshot, Subscription, Unsubscribe};

/// Read half of the backend WebSocket.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for connecting to the backend.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a single request round trip.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`RemoteBackend::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Backend WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    /// Timeout for establishing the WebSocket connection.
    pub connect_timeout: Duration,
    /// Timeout for each request round trip.
    pub request_timeout: Duration,
}

impl RemoteConfig {
    /// Settings for `url` with default timeouts.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

type PendingReply = oneshot::Sender<Result<Reply, Failure>>;

/// State shared between the backend handle and its reader task.
struct Shared {
    outbound: mpsc::UnboundedSender<Message>,
    pending: Mutex<HashMap<RequestId, PendingReply>>,
    subscriptions: Mutex<HashMap<SubscriptionId, watch::Sender<Snapshot>>>,
    next_request: AtomicU64,
    next_subscription: AtomicU64,
    connected: AtomicBool,
    current_user: watch::Sender<Option<UserId>>,
}

impl Shared {
    fn next_request_id(&self) -> RequestId {
        self.next_request.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, request_id: RequestId, request: Request) -> Result<(), StoreError> {
        let frame = ClientFrame {
            request_id,
            request,
        };
        let bytes =
            protocol::encode_client(&frame).map_err(|e| StoreError::Protocol(e.to_string()))?;
        self.outbound
            .send(Message::Binary(bytes.into()))
            .map_err(|_| StoreError::Unavailable("connection closed".to_string()))
    }

    /// Records a sign-in state change. Switching away from a user ends that
    /// user's live queries, which the backend drops as well.
    fn set_user(&self, user: Option<UserId>) {
        let previous = self.current_user.send_replace(user.clone());
        if previous.is_some() && previous != user {
            let dropped = {
                let mut subs = self.subscriptions.lock();
                let n = subs.len();
                subs.clear();
                n
            };
            if dropped > 0 {
                tracing::debug!(count = dropped, "live queries ended by sign-in change");
            }
        }
    }

    fn route(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Response { request_id, result } => {
                let waiter = self.pending.lock().remove(&request_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => {
                        tracing::debug!(request_id, "response for unknown or abandoned request");
                    }
                }
            }
            ServerFrame::Snapshot {
                subscription_id,
                documents,
            } => {
                let subs = self.subscriptions.lock();
                if let Some(tx) = subs.get(&subscription_id) {
                    tracing::trace!(
                        subscription_id,
                        count = documents.len(),
                        "snapshot received"
                    );
                    tx.send_replace(documents);
                } else {
                    tracing::debug!(subscription_id, "snapshot for unknown live query");
                }
            }
        }
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        let failed = {
            let mut pending = self.pending.lock();
            let n = pending.len();
            pending.clear();
            n
        };
        self.subscriptions.lock().clear();
        self.current_user.send_replace(None);
        tracing::info!(pending_failed = failed, "backend connection lost");
    }
}

impl Unsubscribe for Shared {
    fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self.subscriptions.lock().remove(&id).is_some();
        if removed && self.connected.load(Ordering::Acquire) {
            let request_id = self.next_request_id();
            if let Err(e) = self.send(request_id, Request::Unsubscribe(id)) {
                tracing::debug!(subscription_id = id, error = %e, "unsubscribe not sent");
            }
        }
    }
}

/// Connection to the hosted backend, usable as both store and identity
/// provider.
pub struct RemoteBackend {
    shared: Arc<Shared>,
    url: String,
    request_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl RemoteBackend {
    /// Connects to the backend.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`] if the connection is not established within
    ///   `config.connect_timeout`.
    /// - [`StoreError::Unavailable`] if the backend cannot be reached.
    pub async fn connect(config: &RemoteConfig) -> Result<Self, StoreError> {
        let url = config.url.as_str();
        let (ws_stream, _response) = tokio::time::timeout(config.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                tracing::warn!(url, "backend WebSocket connect timed out");
                StoreError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url, err = %e, "backend WebSocket connect failed");
                map_ws_connect_error(e)
            })?;

        let (mut ws_sender, ws_reader) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (current_user, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            outbound,
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            next_request: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            current_user,
        });

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    tracing::warn!(err = %e, "backend send failed");
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });
        let reader = tokio::spawn(reader_loop(ws_reader, Arc::clone(&shared)));

        tracing::info!(url, "connected to backend");
        Ok(Self {
            shared,
            url: url.to_string(),
            request_timeout: config.request_timeout,
            tasks: vec![writer, reader],
        })
    }

    /// The backend URL this client is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns `true` while the connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Sends one request and waits for its outcome.
    ///
    /// The outer error is a transport failure; the inner result is what the
    /// backend answered.
    async fn call(&self, request: Request) -> Result<Result<Reply, Failure>, StoreError> {
        if !self.is_connected() {
            return Err(StoreError::Unavailable("not connected".to_string()));
        }
        let request_id = self.shared.next_request_id();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(request_id, tx);
        // The connection may have dropped between the check and the insert.
        if !self.is_connected() {
            self.shared.pending.lock().remove(&request_id);
            return Err(StoreError::Unavailable("not connected".to_string()));
        }
        if let Err(e) = self.shared.send(request_id, request) {
            self.shared.pending.lock().remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(StoreError::Unavailable("connection lost".to_string())),
            Err(_) => {
                self.shared.pending.lock().remove(&request_id);
                tracing::warn!(request_id, "backend request timed out");
                Err(StoreError::Timeout)
            }
        }
    }

    async fn store_call(&self, request: Request) -> Result<Reply, StoreError> {
        self.call(request).await?.map_err(store_failure)
    }

    async fn identity_call(&self, request: Request) -> Result<Reply, AuthError> {
        self.call(request)
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))?
            .map_err(auth_failure)
    }
}

impl Drop for RemoteBackend {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl DocumentStore for RemoteBackend {
    async fn create(&self, collection: &str, fields: Fields) -> Result<Document, StoreError> {
        match self
            .store_call(Request::Create {
                collection: collection.to_string(),
                fields,
            })
            .await?
        {
            Reply::Created(doc) => Ok(doc),
            other => Err(unexpected(&other)),
        }
    }

    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), StoreError> {
        expect_done(
            self.store_call(Request::Update {
                collection: collection.to_string(),
                id: id.clone(),
                fields,
            })
            .await?,
        )
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        expect_done(
            self.store_call(Request::Delete {
                collection: collection.to_string(),
                id: id.clone(),
            })
            .await?,
        )
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        match self.store_call(Request::Query(query.clone())).await? {
            Reply::Documents(docs) => Ok(docs),
            other => Err(unexpected(&other)),
        }
    }

    async fn batch_delete(&self, collection: &str, ids: &[DocumentId]) -> Result<(), StoreError> {
        expect_done(
            self.store_call(Request::BatchDelete {
                collection: collection.to_string(),
                ids: ids.to_vec(),
            })
            .await?,
        )
    }

    async fn subscribe(&self, query: &Query) -> Result<Subscription, StoreError> {
        let subscription_id = self.shared.next_subscription.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = watch::channel(Vec::new());
        // Registered before the request so the initial snapshot, which the
        // backend sends ahead of the response, has somewhere to land.
        self.shared.subscriptions.lock().insert(subscription_id, tx);

        let outcome = self
            .store_call(Request::Subscribe {
                subscription_id,
                query: query.clone(),
            })
            .await
            .and_then(expect_done);
        if let Err(e) = outcome {
            self.shared.subscriptions.lock().remove(&subscription_id);
            return Err(e);
        }

        rx.mark_unchanged();
        tracing::debug!(subscription_id, collection = %query.collection, "live query started");
        let cancel: Arc<dyn Unsubscribe> = self.shared.clone();
        Ok(Subscription::new(subscription_id, rx, cancel))
    }
}

impl IdentityProvider for RemoteBackend {
    async fn create_account(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let reply = self
            .identity_call(Request::CreateAccount {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;
        self.signed_in(reply)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let reply = self
            .identity_call(Request::SignIn {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;
        self.signed_in(reply)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        match self.identity_call(Request::SignOut).await? {
            Reply::Done => {
                self.shared.set_user(None);
                Ok(())
            }
            other => Err(AuthError::Backend(unexpected(&other).to_string())),
        }
    }

    fn current_user(&self) -> Option<UserId> {
        self.shared.current_user.borrow().clone()
    }

    fn auth_state(&self) -> watch::Receiver<Option<UserId>> {
        self.shared.current_user.subscribe()
    }
}

impl RemoteBackend {
    fn signed_in(&self, reply: Reply) -> Result<UserId, AuthError> {
        match reply {
            Reply::SignedIn(user) => {
                self.shared.set_user(Some(user.clone()));
                Ok(user)
            }
            other => Err(AuthError::Backend(unexpected(&other).to_string())),
        }
    }
}

/// Background task that reads frames from the backend and routes them.
///
/// Malformed frames are logged and skipped. On close or error the shared
/// state is torn down so callers observe the disconnect.
async fn reader_loop(mut ws_reader: WsReader, shared: Arc<Shared>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match protocol::decode_server(&data) {
                Ok(frame) => shared.route(frame),
                Err(e) => {
                    tracing::warn!(err = %e, "malformed backend frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("backend WebSocket closed by server");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(err = %e, "backend WebSocket read error");
                break;
            }
        }
    }
    shared.disconnect();
}

fn store_failure(failure: Failure) -> StoreError {
    match failure {
        Failure::Store(e) => e,
        Failure::Auth(AuthError::NotSignedIn) => StoreError::NotSignedIn,
        Failure::Auth(e) => StoreError::Protocol(format!("unexpected identity failure: {e}")),
    }
}

fn auth_failure(failure: Failure) -> AuthError {
    match failure {
        Failure::Auth(e) => e,
        Failure::Store(e) => AuthError::Backend(e.to_string()),
    }
}

fn expect_done(reply: Reply) -> Result<(), StoreError> {
    match reply {
        Reply::Done => Ok(()),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(reply: &Reply) -> StoreError {
    StoreError::Protocol(format!("unexpected reply {reply:?}"))
}

/// Map a `tokio_tungstenite` connection error to a [`StoreError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> StoreError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => StoreError::Unavailable(format!("backend unreachable: {io_err}")),
        WsError::Tls(_) => StoreError::Unavailable(format!("TLS error: {err}")),
        WsError::Http(response) => StoreError::Unavailable(format!(
            "backend HTTP error: status {}",
            response.status()
        )),
        WsError::Url(e) => StoreError::Unavailable(format!("invalid backend URL: {e}")),
        other => StoreError::Unavailable(format!("backend connection error: {other}")),
    }
}
