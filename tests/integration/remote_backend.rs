//! The board flow against a live in-process `taskboard-server`.
//!
//! Each test binds a server on an ephemeral port and talks to it through
//! `ClientContext::connect`, exercising the WebSocket client, the wire
//! protocol and the server's per-user access rules together.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use taskboard::board::Board;
use taskboard::context::ClientContext;
use taskboard::error::BoardError;
use taskboard::remote::{RemoteBackend, RemoteConfig};
use taskboard::session::TodoSession;
use taskboard::store::DocumentStore;
use taskboard_proto::auth::AuthError;
use taskboard_proto::document::{FieldValue, Fields, Query, StoreError};
use taskboard_proto::model::{ColumnId, Priority, TaskDraft, collections, fields};
use taskboard_server::server::{ServerState, start_server_with_state};

type RemoteCtx = ClientContext<RemoteBackend, RemoteBackend>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn start() -> (Arc<ServerState>, RemoteConfig) {
    let state = Arc::new(ServerState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    let mut config = RemoteConfig::new(format!("ws://{addr}/ws"));
    config.request_timeout = Duration::from_secs(5);
    (state, config)
}

async fn client(config: &RemoteConfig) -> RemoteCtx {
    ClientContext::connect(config).await.unwrap()
}

async fn settle<F>(session: &TodoSession<RemoteBackend>, mut pred: F) -> Board
where
    F: FnMut(&Board) -> bool,
{
    let mut updates = session.updates();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let board = session.board();
            if pred(&board) || updates.changed().await.is_err() {
                return board;
            }
        }
    })
    .await
    .expect("board did not settle")
}

fn milk() -> TaskDraft {
    TaskDraft {
        title: "Milk".to_string(),
        description: "2%".to_string(),
        due_date: "2024-01-01".to_string(),
        priority: Some(Priority::Low),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn groceries_walkthrough_over_websocket() {
    let (state, config) = start().await;
    let ctx = client(&config).await;
    let user = ctx.sign_up("ada@example.com", "hunter22").await.unwrap();
    let session = ctx.open_session(user.clone()).await.unwrap();

    let groceries = session.add_list("Groceries").await.unwrap();
    settle(&session, |b| b.list(&groceries.id).is_some()).await;
    let task = session.add_task(&groceries.id, &milk()).await.unwrap();
    settle(&session, |b| b.task(&task.id).is_some()).await;

    let low = ColumnId::new(groceries.id.clone(), Priority::Low);
    let high = ColumnId::new(groceries.id.clone(), Priority::High);
    session
        .move_task(task.id.as_str(), &low.to_string(), &high.to_string())
        .await
        .unwrap()
        .unwrap();
    let board = settle(&session, |b| {
        b.pending_moves() == 0 && b.column(&high).len() == 1
    })
    .await;
    assert!(board.column(&low).is_empty());
    assert_eq!(board.task(&task.id).unwrap().list_id, groceries.id);

    session.delete_list(&groceries.id).await.unwrap();
    let board = settle(&session, |b| b.lists().is_empty() && b.tasks().is_empty()).await;
    assert!(board.lists().is_empty());

    assert!(state.db.query(&user, &Query::collection(collections::LISTS)).await.is_empty());
    assert!(state.db.query(&user, &Query::collection(collections::TASKS)).await.is_empty());
    ctx.log_out().await.unwrap();
}

#[tokio::test]
async fn second_device_sees_changes_live() {
    let (_state, config) = start().await;
    let phone = client(&config).await;
    let user = phone.sign_up("ada@example.com", "hunter22").await.unwrap();
    let phone_session = phone.open_session(user).await.unwrap();

    let laptop = client(&config).await;
    let user = laptop.log_in("ada@example.com", "hunter22").await.unwrap();
    let laptop_session = laptop.open_session(user).await.unwrap();

    let list = laptop_session.add_list("Errands").await.unwrap();
    let board = settle(&phone_session, |b| b.list(&list.id).is_some()).await;
    assert_eq!(board.list(&list.id).unwrap().name, "Errands");

    laptop_session.rename_list(&list.id, "Chores").await.unwrap();
    settle(&phone_session, |b| {
        b.list(&list.id).is_some_and(|l| l.name == "Chores")
    })
    .await;
}

#[tokio::test]
async fn users_cannot_touch_each_others_documents() {
    let (_state, config) = start().await;
    let ada = client(&config).await;
    let ada_id = ada.sign_up("ada@example.com", "hunter22").await.unwrap();
    let ada_session = ada.open_session(ada_id).await.unwrap();
    let list = ada_session.add_list("Private").await.unwrap();

    let eve = client(&config).await;
    let eve_id = eve.sign_up("eve@example.com", "hunter22").await.unwrap();
    let eve_session = eve.open_session(eve_id.clone()).await.unwrap();
    assert!(eve_session.board().lists().is_empty());

    let err = eve_session.rename_list(&list.id, "Mine now").await.unwrap_err();
    assert!(matches!(err, BoardError::Store(StoreError::PermissionDenied(_))));
    assert_eq!(err.user_message(), "You do not have access to that item.");

    // Writing a document that claims someone else's id is refused too.
    let forged = eve
        .store()
        .create(
            collections::LISTS,
            Fields::from([
                (fields::NAME.to_string(), FieldValue::from("Forged")),
                (fields::USER_ID.to_string(), FieldValue::from("someone-else")),
            ]),
        )
        .await;
    assert!(matches!(forged, Err(StoreError::PermissionDenied(_))));

    let board = settle(&ada_session, |b| b.lists().len() == 1).await;
    assert_eq!(board.lists()[0].name, "Private");
    assert_ne!(board.lists()[0].owner_id, eve_id);
}

#[tokio::test]
async fn auth_failures_come_back_as_auth_errors() {
    let (_state, config) = start().await;
    let ctx = client(&config).await;
    ctx.sign_up("ada@example.com", "hunter22").await.unwrap();

    let other = client(&config).await;
    assert_eq!(
        other.sign_up("ada@example.com", "hunter22").await,
        Err(BoardError::Auth(AuthError::EmailInUse))
    );
    assert_eq!(
        other.log_in("ada@example.com", "wrong-password").await,
        Err(BoardError::Auth(AuthError::WrongCredentials))
    );
    assert_eq!(
        other.sign_up("ada@example.com", "123").await,
        Err(BoardError::Auth(AuthError::WeakPassword))
    );
}

#[tokio::test]
async fn log_out_ends_the_session() {
    let (_state, config) = start().await;
    let ctx = client(&config).await;
    let user = ctx.sign_up("ada@example.com", "hunter22").await.unwrap();
    let session = ctx.open_session(user).await.unwrap();
    ctx.log_out().await.unwrap();
    assert!(!session.is_live());

    let err = ctx
        .store()
        .query(&Query::collection(collections::LISTS))
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::NotSignedIn);
}

#[tokio::test]
async fn unreachable_server_is_a_store_error() {
    let mut config = RemoteConfig::new("ws://127.0.0.1:1/ws");
    config.connect_timeout = Duration::from_secs(2);
    let err = ClientContext::connect(&config).await.unwrap_err();
    assert!(matches!(
        err,
        BoardError::Store(StoreError::Unavailable(_) | StoreError::Timeout)
    ));
}
