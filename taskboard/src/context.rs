//! Client context: the store, the identity provider and the open session.
//!
//! Build one per process (or per test) and pass it around. Nothing here is
//! global, so several contexts can coexist against different backends.

use std::sync::Arc;

use parking_lot::Mutex;
use taskboard_proto::auth::AuthError;
use taskboard_proto::model::UserId;

use crate::adapter::ListTaskStore;
use crate::error::BoardError;
use crate::identity::IdentityProvider;
use crate::identity::memory::MemoryIdentity;
use crate::remote::{RemoteBackend, RemoteConfig};
use crate::session::TodoSession;
use crate::store::DocumentStore;
use crate::store::memory::MemoryStore;

/// Owns the backend collaborators and at most one open [`TodoSession`].
pub struct ClientContext<S, I> {
    store: Arc<S>,
    identity: Arc<I>,
    session: Mutex<Option<Arc<TodoSession<S>>>>,
}

impl<S, I> std::fmt::Debug for ClientContext<S, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("session", &self.session.lock().as_ref().map(|s| s.user().clone()))
            .finish_non_exhaustive()
    }
}

impl ClientContext<MemoryStore, MemoryIdentity> {
    /// A context backed by an in-process store and identity provider.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryIdentity::new()))
    }
}

impl ClientContext<RemoteBackend, RemoteBackend> {
    /// Connects to a `taskboard-server` and uses it for both documents and
    /// accounts.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if the connection cannot be established.
    pub async fn connect(config: &RemoteConfig) -> Result<Self, BoardError> {
        let backend = Arc::new(RemoteBackend::connect(config).await?);
        Ok(Self::new(Arc::clone(&backend), backend))
    }
}

impl<S: DocumentStore, I: IdentityProvider> ClientContext<S, I> {
    /// Wraps explicit collaborators.
    #[must_use]
    pub fn new(store: Arc<S>, identity: Arc<I>) -> Self {
        Self {
            store,
            identity,
            session: Mutex::new(None),
        }
    }

    /// The document store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The identity provider.
    #[must_use]
    pub const fn identity(&self) -> &Arc<I> {
        &self.identity
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<UserId> {
        self.identity.current_user()
    }

    /// Creates an account and signs it in.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Auth`] if the account cannot be created.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<UserId, BoardError> {
        let user = self.identity.create_account(email, password).await?;
        self.close_session_unless(&user);
        Ok(user)
    }

    /// Signs in with existing credentials.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Auth`] on bad credentials or backend failure.
    pub async fn log_in(&self, email: &str, password: &str) -> Result<UserId, BoardError> {
        let user = self.identity.sign_in(email, password).await?;
        self.close_session_unless(&user);
        Ok(user)
    }

    /// Opens and starts a session for `user`, replacing any open one.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotSignedIn`] unless `user` is the signed-in
    /// user, or [`BoardError::Store`] if the session cannot start.
    pub async fn open_session(&self, user: UserId) -> Result<Arc<TodoSession<S>>, BoardError> {
        if self.identity.current_user().as_ref() != Some(&user) {
            return Err(AuthError::NotSignedIn.into());
        }
        self.close_session();
        let session = Arc::new(TodoSession::new(
            user,
            ListTaskStore::new(Arc::clone(&self.store)),
        ));
        session.start().await?;
        *self.session.lock() = Some(Arc::clone(&session));
        Ok(session)
    }

    /// The open session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Arc<TodoSession<S>>> {
        self.session.lock().clone()
    }

    /// Shuts the open session down, then signs out.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Auth`] if nobody is signed in or sign-out fails.
    /// The session is closed either way.
    pub async fn log_out(&self) -> Result<(), BoardError> {
        self.close_session();
        self.identity.sign_out().await?;
        Ok(())
    }

    /// Closes the open session without signing out.
    pub fn shutdown(&self) {
        self.close_session();
    }

    fn close_session(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.shutdown();
        }
    }

    fn close_session_unless(&self, user: &UserId) {
        let stale = self
            .session
            .lock()
            .as_ref()
            .is_some_and(|s| s.user() != user);
        if stale {
            self.close_session();
        }
    }
}
