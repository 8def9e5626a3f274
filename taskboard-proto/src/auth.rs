//! Account credential rules and authentication errors.
//!
//! Both the backend's account registry and the in-process identity provider
//! apply the same rules, so they live next to the wire types.

use serde::{Deserialize, Serialize};

/// Minimum accepted password length in characters.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Errors from sign-up, sign-in and sign-out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum AuthError {
    /// The email address is not of the form `local@domain`.
    #[error("invalid email address")]
    InvalidEmail,
    /// The password is shorter than [`MIN_PASSWORD_LENGTH`].
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    WeakPassword,
    /// An account with this email already exists.
    #[error("an account with this email already exists")]
    EmailInUse,
    /// Unknown email or wrong password.
    #[error("wrong email or password")]
    WrongCredentials,
    /// The operation needs a signed-in user.
    #[error("not signed in")]
    NotSignedIn,
    /// The identity backend failed for a reason unrelated to credentials.
    #[error("identity backend error: {0}")]
    Backend(String),
}

/// Canonical form of an email address used as the account key.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Checks the shape of an email/password pair for account creation.
///
/// # Errors
///
/// Returns [`AuthError::InvalidEmail`] or [`AuthError::WeakPassword`].
pub fn validate_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    let email = email.trim();
    let valid_email = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && !domain.is_empty() && !domain.contains('@')
    });
    if !valid_email || email.contains(char::is_whitespace) {
        return Err(AuthError::InvalidEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}
