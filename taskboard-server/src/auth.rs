//! Account registry for email/password sign-in.
//!
//! Accounts are keyed by normalized email. Passwords are stored as a salted
//! SHA-256 digest; the salt is random per account.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use taskboard_proto::auth::{AuthError, normalize_email, validate_credentials};
use taskboard_proto::model::UserId;
use tokio::sync::RwLock;
use uuid::Uuid;

struct Account {
    user_id: UserId,
    salt: [u8; 16],
    password_hash: String,
}

impl Account {
    fn verify(&self, password: &str) -> bool {
        let candidate = hash_password(&self.salt, password);
        candidate.as_bytes().ct_eq(self.password_hash.as_bytes()).into()
    }
}

/// Registered accounts, shared by all connections.
#[derive(Default)]
pub struct AccountRegistry {
    accounts: RwLock<HashMap<String, Account>>,
}

impl AccountRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new account and returns its user id.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidEmail`] or [`AuthError::WeakPassword`] for
    /// malformed credentials, and [`AuthError::EmailInUse`] if the email is
    /// already registered.
    pub async fn create_account(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        validate_credentials(email, password)?;
        let key = normalize_email(email);

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(AuthError::EmailInUse);
        }
        let salt: [u8; 16] = rand::random();
        let user_id = UserId::new(Uuid::now_v7().to_string());
        accounts.insert(
            key,
            Account {
                user_id: user_id.clone(),
                salt,
                password_hash: hash_password(&salt, password),
            },
        );
        drop(accounts);

        tracing::info!(user_id = %user_id, "account created");
        Ok(user_id)
    }

    /// Checks credentials and returns the account's user id.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::WrongCredentials`] for an unknown email or a
    /// wrong password. The two cases are indistinguishable to the caller.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let key = normalize_email(email);
        let accounts = self.accounts.read().await;
        match accounts.get(&key) {
            Some(account) if account.verify(password) => Ok(account.user_id.clone()),
            _ => Err(AuthError::WrongCredentials),
        }
    }

    /// Number of registered accounts.
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Returns `true` if no account is registered.
    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

fn hash_password(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
