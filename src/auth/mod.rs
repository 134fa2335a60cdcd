//! Local accounts: registration, login and lifetime walking totals, kept in
//! the same key-value port as the territory set.

mod models;
mod password;
mod store;

use thiserror::Error;

pub use models::{PublicUser, StoredAccount, UserStats, UserTable};
pub use store::AccountStore;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("All fields are required")]
    MissingFields,
    #[error("Username must be at least 3 characters")]
    UsernameTooShort,
    #[error("Password must be at least 4 characters")]
    PasswordTooShort,
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Not logged in")]
    NotLoggedIn,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl AuthError {
    /// Rejected input, as opposed to a storage failure.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, AuthError::Storage(_))
    }
}

/// Usernames are case-insensitive and ignore surrounding whitespace.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}
