//! Backend server core: shared state, WebSocket handler, and request
//! dispatch.
//!
//! Every WebSocket connection is one session. A session starts signed out;
//! `SignIn` or `CreateAccount` attaches a user to it, and every store
//! operation then runs as that user. Requests are processed one at a time
//! per connection, so responses come back in request order. Live query
//! snapshots share the same outbound channel, which keeps the initial
//! snapshot of a `Subscribe` ahead of its response.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use taskboard_proto::auth::AuthError;
use taskboard_proto::document::StoreError;
use taskboard_proto::model::UserId;
use taskboard_proto::protocol::{self, ClientFrame, Failure, Reply, Request, ServerFrame};
use tokio::sync::mpsc;

use crate::auth::AccountRegistry;
use crate::db::{DocumentDb, SessionId};

/// Default maximum accepted size of one inbound frame in bytes (256 KB).
const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024;

/// Shared server state: the document database and the account registry.
pub struct ServerState {
    /// Document database shared by all sessions.
    pub db: DocumentDb,
    /// Registered accounts.
    pub accounts: AccountRegistry,
    max_frame_size: usize,
    next_session: AtomicU64,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    /// Creates an empty state with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_FRAME_SIZE, DocumentDb::new())
    }

    /// Creates an empty state with a custom frame size limit and database.
    #[must_use]
    pub fn with_config(max_frame_size: usize, db: DocumentDb) -> Self {
        Self {
            db,
            accounts: AccountRegistry::new(),
            max_frame_size,
            next_session: AtomicU64::new(1),
        }
    }

    fn open_session(&self) -> SessionId {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }
}

/// Per-connection state owned by the reader loop.
struct Session {
    id: SessionId,
    user: Option<UserId>,
    outbound: mpsc::UnboundedSender<ServerFrame>,
}

impl Session {
    fn user(&self) -> Result<&UserId, StoreError> {
        self.user.as_ref().ok_or(StoreError::NotSignedIn)
    }
}

/// Handles an upgraded WebSocket connection for a single session.
///
/// The connection lifecycle:
/// 1. Allocate a session id and an outbound channel.
/// 2. Spawn a writer task that encodes outbound frames onto the socket.
/// 3. Run the reader loop, answering each request in order.
/// 4. On disconnect, drop every live query the session held.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let session_id = state.open_session();
    tracing::info!(session = session_id, "session opened");

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let bytes = match protocol::encode_server(&frame) {
                Ok(b) => b,
                Err(e) => {
                    tracing::error!(session = session_id, error = %e, "failed to encode frame");
                    continue;
                }
            };
            if ws_sender.send(Message::Binary(bytes.into())).await.is_err() {
                tracing::warn!(session = session_id, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        let mut session = Session {
            id: session_id,
            user: None,
            outbound: tx,
        };
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(&mut session, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(session = session_id, "received close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    let dropped = state.db.unwatch_session(session_id).await;
    tracing::info!(session = session_id, live_queries = dropped, "session closed");
}

/// Decodes one inbound frame, runs it, and queues the response.
async fn handle_binary_message(session: &mut Session, data: &[u8], state: &Arc<ServerState>) {
    let frame = match protocol::decode_client(data) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(session = session.id, error = %e, "failed to decode frame");
            return;
        }
    };
    let ClientFrame {
        request_id,
        request,
    } = frame;

    let result = if data.len() > state.max_frame_size {
        tracing::warn!(
            session = session.id,
            size = data.len(),
            max = state.max_frame_size,
            "frame exceeds size limit"
        );
        Err(Failure::Store(StoreError::ResourceExhausted(format!(
            "frame too large: {} bytes (max {})",
            data.len(),
            state.max_frame_size
        ))))
    } else {
        tracing::debug!(session = session.id, request_id, request = ?request, "handling request");
        handle_request(session, request, state).await
    };

    if let Err(failure) = &result {
        tracing::debug!(session = session.id, request_id, error = %failure, "request failed");
    }
    let _ = session
        .outbound
        .send(ServerFrame::Response { request_id, result });
}

async fn handle_request(
    session: &mut Session,
    request: Request,
    state: &ServerState,
) -> Result<Reply, Failure> {
    match request {
        Request::CreateAccount { email, password } => {
            let user = state.accounts.create_account(&email, &password).await?;
            Ok(attach_user(session, user, state).await)
        }
        Request::SignIn { email, password } => {
            let user = state.accounts.sign_in(&email, &password).await?;
            Ok(attach_user(session, user, state).await)
        }
        Request::SignOut => {
            let Some(user) = session.user.take() else {
                return Err(AuthError::NotSignedIn.into());
            };
            state.db.unwatch_session(session.id).await;
            tracing::info!(session = session.id, user_id = %user, "signed out");
            Ok(Reply::Done)
        }
        Request::Create { collection, fields } => {
            let doc = state.db.create(session.user()?, &collection, fields).await?;
            Ok(Reply::Created(doc))
        }
        Request::Update {
            collection,
            id,
            fields,
        } => {
            state
                .db
                .update(session.user()?, &collection, &id, fields)
                .await?;
            Ok(Reply::Done)
        }
        Request::Delete { collection, id } => {
            state.db.delete(session.user()?, &collection, &id).await?;
            Ok(Reply::Done)
        }
        Request::Query(query) => {
            let docs = state.db.query(session.user()?, &query).await;
            Ok(Reply::Documents(docs))
        }
        Request::BatchDelete { collection, ids } => {
            state
                .db
                .batch_delete(session.user()?, &collection, &ids)
                .await?;
            Ok(Reply::Done)
        }
        Request::Subscribe {
            subscription_id,
            query,
        } => {
            let user = session.user()?;
            state
                .db
                .watch(
                    session.id,
                    user,
                    subscription_id,
                    query,
                    session.outbound.clone(),
                )
                .await?;
            Ok(Reply::Done)
        }
        Request::Unsubscribe(subscription_id) => {
            state.db.unwatch(session.id, subscription_id).await;
            Ok(Reply::Done)
        }
    }
}

/// Binds `user` to the session, dropping live queries of any previous user.
async fn attach_user(session: &mut Session, user: UserId, state: &ServerState) -> Reply {
    if let Some(previous) = session.user.replace(user.clone())
        && previous != user
    {
        state.db.unwatch_session(session.id).await;
    }
    tracing::info!(session = session.id, user_id = %user, "signed in");
    Reply::SignedIn(user)
}

/// Starts the server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(ServerState::new())).await
}

/// Starts the server with a pre-configured [`ServerState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
