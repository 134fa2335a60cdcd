use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::storage::{load_json, save_json, KeyValueStore, Stored, SESSION_KEY, USERS_KEY};

use super::{
    normalize_username,
    password::{hash_password, verify_password},
    AuthError, PublicUser, StoredAccount, UserStats, UserTable, MIN_PASSWORD_LEN, MIN_USERNAME_LEN,
};

const ENABLE_LOGS: bool = true;
use crate::{log_info, log_warn};

pub struct AccountStore {
    port: Arc<dyn KeyValueStore>,
    /// Mirrors the session pointer. Held across every read-modify-write of
    /// the user table.
    current: Mutex<Option<PublicUser>>,
}

impl AccountStore {
    pub async fn load(port: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let current = match load_json::<PublicUser>(port.as_ref(), SESSION_KEY).await? {
            Stored::Value(user) => Some(user),
            Stored::Missing => None,
            Stored::Corrupt { error, .. } => {
                log_warn!("session pointer unreadable ({error}); treating as logged out");
                None
            }
        };

        if let Some(user) = &current {
            log_info!("resumed session for {}", user.username);
        }

        Ok(Self {
            port,
            current: Mutex::new(current),
        })
    }

    pub async fn current_user(&self) -> Option<PublicUser> {
        self.current.lock().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Creates the account and logs it in.
    pub async fn register(&self, username: &str, password: &str) -> Result<PublicUser, AuthError> {
        let normalized = normalize_username(username);
        if normalized.is_empty() || password.is_empty() {
            return Err(AuthError::MissingFields);
        }
        if normalized.chars().count() < MIN_USERNAME_LEN {
            return Err(AuthError::UsernameTooShort);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }

        let mut current = self.current.lock().await;
        let mut users = self.writable_users().await?;
        if users.contains_key(&normalized) {
            return Err(AuthError::UsernameTaken);
        }

        let user = PublicUser {
            username: normalized.clone(),
            display_name: username.trim().to_string(),
            created_at: Utc::now().timestamp_millis(),
            stats: UserStats::default(),
        };
        users.insert(
            normalized,
            StoredAccount {
                profile: user.clone(),
                password_hash: Some(hash_password(password)?),
                password: None,
            },
        );

        save_json(self.port.as_ref(), USERS_KEY, &users).await?;
        save_json(self.port.as_ref(), SESSION_KEY, &user).await?;
        log_info!("registered {}", user.username);

        *current = Some(user.clone());
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<PublicUser, AuthError> {
        let normalized = normalize_username(username);
        let mut current = self.current.lock().await;

        let mut users = match load_json::<UserTable>(self.port.as_ref(), USERS_KEY).await? {
            Stored::Value(users) => users,
            Stored::Missing => UserTable::new(),
            Stored::Corrupt { error, .. } => {
                log_warn!("account table unreadable ({error}); no account can log in");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let Some(account) = users.get_mut(&normalized) else {
            return Err(AuthError::InvalidCredentials);
        };

        let verified = match (&account.password_hash, &account.password) {
            (Some(phc), _) => verify_password(password, phc)?,
            (None, Some(legacy)) => legacy == password,
            (None, None) => false,
        };
        if !verified {
            return Err(AuthError::InvalidCredentials);
        }

        let needs_upgrade = account.password_hash.is_none();
        if needs_upgrade {
            account.password_hash = Some(hash_password(password)?);
            account.password = None;
        }
        let user = account.profile.clone();

        if needs_upgrade {
            match save_json(self.port.as_ref(), USERS_KEY, &users).await {
                Ok(()) => log_info!("upgraded stored password for {normalized}"),
                Err(err) => log_warn!("could not upgrade stored password for {normalized}: {err:?}"),
            }
        }

        save_json(self.port.as_ref(), SESSION_KEY, &user).await?;
        log_info!("logged in {}", user.username);

        *current = Some(user.clone());
        Ok(user)
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        let mut current = self.current.lock().await;
        self.port.remove(SESSION_KEY).await?;
        if let Some(user) = current.take() {
            log_info!("logged out {}", user.username);
        }
        Ok(())
    }

    /// Adds one finished walk to the logged-in user's totals.
    pub async fn update_stats(&self, distance_meters: f64, elapsed_seconds: u64) -> Result<PublicUser, AuthError> {
        let mut current = self.current.lock().await;
        let Some(session_user) = current.clone() else {
            return Err(AuthError::NotLoggedIn);
        };

        let mut users = self.writable_users().await?;
        let Some(account) = users.get_mut(&session_user.username) else {
            log_warn!(
                "session user {} has no account record; totals not updated",
                session_user.username
            );
            return Ok(session_user);
        };

        let stats = &mut account.profile.stats;
        stats.total_distance += distance_meters.max(0.0);
        stats.total_time += elapsed_seconds;
        stats.total_walks += 1;
        let user = account.profile.clone();

        save_json(self.port.as_ref(), USERS_KEY, &users).await?;
        save_json(self.port.as_ref(), SESSION_KEY, &user).await?;

        *current = Some(user.clone());
        Ok(user)
    }

    /// The user table for a write. A table that exists but does not parse is
    /// never overwritten.
    async fn writable_users(&self) -> Result<UserTable, AuthError> {
        match load_json::<UserTable>(self.port.as_ref(), USERS_KEY).await? {
            Stored::Value(users) => Ok(users),
            Stored::Missing => Ok(UserTable::new()),
            Stored::Corrupt { error, .. } => Err(AuthError::Storage(anyhow!(
                "account table is unreadable ({error}); refusing to overwrite it"
            ))),
        }
    }
}
