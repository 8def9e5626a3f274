//! Identity provider abstraction.
//!
//! The identity provider owns credentials and the "who is signed in now"
//! state. Implementations:
//! - [`memory::MemoryIdentity`]: in-process accounts for tests
//! - [`crate::remote::RemoteBackend`]: the hosted backend's account service

pub mod memory;

use taskboard_proto::auth::AuthError;
use taskboard_proto::model::UserId;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Email/password identity service with observable sign-in state.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Registers a new account and signs it in.
    fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<UserId, AuthError>> + Send;

    /// Signs in with existing credentials.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<UserId, AuthError>> + Send;

    /// Signs the current user out.
    fn sign_out(&self) -> impl std::future::Future<Output = Result<(), AuthError>> + Send;

    /// The signed-in user, if any.
    fn current_user(&self) -> Option<UserId>;

    /// Receiver that observes every sign-in state change.
    fn auth_state(&self) -> watch::Receiver<Option<UserId>>;
}

/// Keeps an auth state callback alive. Dropping it stops the callback.
#[derive(Debug)]
pub struct AuthListener {
    task: JoinHandle<()>,
}

impl AuthListener {
    /// Stops the callback.
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for AuthListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Runs `callback` with the current user right away, then after every
/// sign-in or sign-out.
///
/// Must be called within a Tokio runtime.
pub fn on_auth_state_change<I, F>(provider: &I, mut callback: F) -> AuthListener
where
    I: IdentityProvider + ?Sized,
    F: FnMut(Option<UserId>) + Send + 'static,
{
    let mut rx = provider.auth_state();
    let task = tokio::spawn(async move {
        let current = rx.borrow_and_update().clone();
        callback(current);
        while rx.changed().await.is_ok() {
            let user = rx.borrow_and_update().clone();
            callback(user);
        }
    });
    AuthListener { task }
}
