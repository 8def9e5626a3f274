//! In-process identity provider for tests and embedding.
//!
//! Applies the same credential rules as the hosted backend but keeps
//! passwords in memory as given. Not meant for anything that persists.

use std::collections::HashMap;

use parking_lot::Mutex;
use taskboard_proto::auth::{AuthError, normalize_email, validate_credentials};
use taskboard_proto::model::UserId;
use tokio::sync::watch;
use uuid::Uuid;

use super::IdentityProvider;

struct Account {
    user_id: UserId,
    password: String,
}

/// In-memory [`IdentityProvider`].
pub struct MemoryIdentity {
    accounts: Mutex<HashMap<String, Account>>,
    current: watch::Sender<Option<UserId>>,
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentity {
    /// Creates a provider with no accounts and nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current,
        }
    }

    fn set_current(&self, user: Option<UserId>) {
        self.current.send_if_modified(|current| {
            if *current == user {
                false
            } else {
                *current = user;
                true
            }
        });
    }
}

impl IdentityProvider for MemoryIdentity {
    async fn create_account(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        validate_credentials(email, password)?;
        let key = normalize_email(email);
        let user_id = {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(&key) {
                return Err(AuthError::EmailInUse);
            }
            let user_id = UserId::new(Uuid::now_v7().to_string());
            accounts.insert(
                key,
                Account {
                    user_id: user_id.clone(),
                    password: password.to_string(),
                },
            );
            user_id
        };
        tracing::info!(user_id = %user_id, "account created");
        self.set_current(Some(user_id.clone()));
        Ok(user_id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let key = normalize_email(email);
        let user_id = match self.accounts.lock().get(&key) {
            Some(account) if account.password == password => account.user_id.clone(),
            _ => return Err(AuthError::WrongCredentials),
        };
        tracing::info!(user_id = %user_id, "signed in");
        self.set_current(Some(user_id.clone()));
        Ok(user_id)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(user_id) = self.current_user() else {
            return Err(AuthError::NotSignedIn);
        };
        self.set_current(None);
        tracing::info!(user_id = %user_id, "signed out");
        Ok(())
    }

    fn current_user(&self) -> Option<UserId> {
        self.current.borrow().clone()
    }

    fn auth_state(&self) -> watch::Receiver<Option<UserId>> {
        self.current.subscribe()
    }
}
