//! Per-user account cache.
//!
//! Holds the token material obtained for each signed-in user, keyed by the
//! home account id. In-memory only: a process restart empties it, which is
//! exactly the condition the `TokenNotFound` error reports to callers.

use crate::auth::confidential::TokenResponse;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use zeroize::Zeroize;

/// A cached authentication record for one user.
#[derive(Debug, Clone)]
pub struct CachedAccount {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: String,
}

impl CachedAccount {
    /// Build a cache record from a token endpoint response.
    pub fn from_token_response(user_id: impl Into<String>, token: &TokenResponse) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: Utc::now() + Duration::seconds(token.expires_in as i64),
            scope: token.scope.clone(),
        }
    }

    /// Whether the access token is still usable, refreshing `skew_seconds`
    /// ahead of the actual expiry.
    pub fn is_valid(&self, skew_seconds: u64) -> bool {
        Utc::now() + Duration::seconds(skew_seconds as i64) < self.expires_at
    }
}

impl Zeroize for CachedAccount {
    fn zeroize(&mut self) {
        self.access_token.zeroize();
        if let Some(ref mut rt) = self.refresh_token {
            rt.zeroize();
        }
    }
}

impl Drop for CachedAccount {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Shared in-memory account cache.
#[derive(Default)]
pub struct AccountCache {
    accounts: RwLock<HashMap<String, CachedAccount>>,
}

impl AccountCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the cached account for a user.
    pub async fn get(&self, user_id: &str) -> Option<CachedAccount> {
        self.accounts.read().await.get(user_id).cloned()
    }

    /// Insert or replace the account for a user.
    pub async fn insert(&self, account: CachedAccount) {
        self.accounts
            .write()
            .await
            .insert(account.user_id.clone(), account);
    }

    /// Remove the account for a user, e.g. after a failed refresh.
    pub async fn remove(&self, user_id: &str) {
        self.accounts.write().await.remove(user_id);
    }

    /// Number of cached accounts.
    #[allow(dead_code)]
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    #[allow(dead_code)]
    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}
