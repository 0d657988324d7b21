use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),
    #[error("failed to hash password: {0}")]
    Hash(String),
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
    pub is_active: bool,
    password_hash: String,
}

/// In-memory account directory keyed by username.
#[derive(Clone, Default)]
pub struct AccountDirectory {
    inner: Arc<RwLock<HashMap<String, Account>>>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        username: &str,
        password: &str,
        roles: Vec<String>,
    ) -> Result<Account, StoreError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(StoreError::EmptyUsername);
        }
        let password_hash = hash_password(password)?;

        let mut guard = self.inner.write().expect("rwlock poisoned");
        if guard.contains_key(username) {
            return Err(StoreError::DuplicateUsername(username.to_string()));
        }
        let account = Account {
            id: Uuid::new_v4(),
            username: username.to_string(),
            roles,
            is_active: true,
            password_hash,
        };
        guard.insert(account.username.clone(), account.clone());
        Ok(account)
    }

    /// Returns the active account matching the credentials.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<Account> {
        let guard = self.inner.read().expect("rwlock poisoned");
        let account = guard.get(username.trim())?;
        if !account.is_active {
            return None;
        }
        let parsed = PasswordHash::new(&account.password_hash).ok()?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .ok()
            .map(|_| account.clone())
    }

    pub fn get(&self, id: Uuid) -> Option<Account> {
        let guard = self.inner.read().expect("rwlock poisoned");
        guard.values().find(|account| account.id == id).cloned()
    }

    pub fn set_active(&self, id: Uuid, active: bool) -> bool {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        match guard.values_mut().find(|account| account.id == id) {
            Some(account) => {
                account.is_active = active;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Single-use refresh tokens, stored by SHA-256 digest only.
#[derive(Clone, Default)]
pub struct RefreshTokenStore {
    inner: Arc<RwLock<HashMap<Vec<u8>, RefreshRecord>>>,
}

impl RefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `token` and evicts every record that has already lapsed.
    pub fn record(&self, token: &str, record: RefreshRecord) {
        let now = Utc::now();
        let mut guard = self.inner.write().expect("rwlock poisoned");
        guard.retain(|_, existing| existing.expires_at > now);
        guard.insert(hash_refresh_token(token), record);
    }

    /// Removes the token and returns its record if it was still live. A token
    /// is gone after the first call whatever the outcome.
    pub fn consume(&self, token: &str) -> Option<RefreshRecord> {
        if token.trim().is_empty() {
            return None;
        }
        let mut guard = self.inner.write().expect("rwlock poisoned");
        let record = guard.remove(&hash_refresh_token(token))?;
        (record.expires_at > Utc::now()).then_some(record)
    }

    pub fn revoke(&self, token: &str) -> bool {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        guard.remove(&hash_refresh_token(token)).is_some()
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().expect("rwlock poisoned");
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

fn hash_password(password: &str) -> Result<String, StoreError> {
    if password.trim().is_empty() {
        return Err(StoreError::EmptyPassword);
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| StoreError::Hash(err.to_string()))
}
