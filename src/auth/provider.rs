//! Graph auth provider: the thin wrapper web handlers talk to.
//!
//! Two operations: retrieve a cached access token for a known user (silent
//! path) and exchange an authorization code during initial sign-in. All
//! protocol work is delegated to the confidential client; this layer owns the
//! account cache and the two error translations callers depend on.

use crate::auth::cache::{AccountCache, CachedAccount};
use crate::auth::confidential::{ConfidentialClient, TokenResponse};
use crate::error::AuthError;
use tracing::{debug, info, warn};
use url::Url;

/// Result of an authorization-code sign-in.
#[derive(Debug)]
pub struct SignInResult {
    /// Home account id the tokens were cached under.
    pub user_id: String,
    /// The full token response from the authority.
    pub token: TokenResponse,
}

/// Provider handing out Microsoft Graph access tokens for signed-in users.
pub struct GraphAuthProvider {
    client: ConfidentialClient,
    pub(crate) cache: AccountCache,
    refresh_skew_seconds: u64,
}

impl GraphAuthProvider {
    pub fn new(client: ConfidentialClient, refresh_skew_seconds: u64) -> Self {
        Self {
            client,
            cache: AccountCache::new(),
            refresh_skew_seconds,
        }
    }

    /// The authority the underlying client was built against.
    pub fn authority(&self) -> &str {
        self.client.authority()
    }

    /// Authorization URL plus CSRF state for browser sign-in.
    pub fn generate_auth_url(&self) -> (Url, String) {
        self.client.generate_auth_url()
    }

    /// Get an access token for a known user, from cache or via silent refresh.
    ///
    /// Fails with `TokenNotFound` when no account is cached for the user, and
    /// with the coarse `AuthenticationFailure` when silent acquisition fails
    /// for any reason; both tell the caller to send the user back through
    /// interactive sign-in.
    pub async fn get_user_access_token(&self, user_id: &str) -> Result<String, AuthError> {
        let account = self
            .cache
            .get(user_id)
            .await
            .ok_or(AuthError::TokenNotFound)?;

        if account.is_valid(self.refresh_skew_seconds) {
            debug!("Returning cached access token for {}", user_id);
            return Ok(account.access_token.clone());
        }

        match self.refresh_account(&account).await {
            Ok(access_token) => Ok(access_token),
            Err(e) => {
                warn!("Silent token acquisition failed for {}: {}", user_id, e);
                // The stale record is useless now; drop it so the next call
                // reports TokenNotFound instead of failing the same way.
                self.cache.remove(user_id).await;
                Err(AuthError::AuthenticationFailure)
            }
        }
    }

    /// Exchange a one-time authorization code for tokens and cache the account.
    ///
    /// Failures propagate unmodified from the confidential client.
    pub async fn get_user_access_token_by_authorization_code(
        &self,
        code: &str,
    ) -> Result<SignInResult, AuthError> {
        let token = self.client.redeem_authorization_code(code).await?;

        let user_id = token.home_account_id().ok_or_else(|| {
            AuthError::TokenExchangeFailed("token response carried no usable identity".into())
        })?;

        self.cache
            .insert(CachedAccount::from_token_response(user_id.clone(), &token))
            .await;

        info!("Cached account for {}", user_id);
        Ok(SignInResult { user_id, token })
    }

    /// Redeem the account's refresh token and update the cache.
    async fn refresh_account(&self, account: &CachedAccount) -> Result<String, AuthError> {
        let refresh_token = account
            .refresh_token
            .as_deref()
            .ok_or(AuthError::AuthenticationFailure)?;

        let token = self.client.redeem_refresh_token(refresh_token).await?;

        let updated = CachedAccount::from_token_response(account.user_id.clone(), &token);
        let access_token = updated.access_token.clone();
        self.cache.insert(updated).await;

        debug!("Refreshed access token for {}", account.user_id);
        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_fixtures::test_client;
    use chrono::{Duration, Utc};

    fn provider() -> GraphAuthProvider {
        GraphAuthProvider::new(test_client(), 300)
    }

    /// Provider whose token endpoint is unreachable, so any refresh attempt
    /// fails without real network traffic.
    fn provider_with_dead_endpoint() -> GraphAuthProvider {
        let client = test_client().with_token_endpoint("http://127.0.0.1:1/token");
        GraphAuthProvider::new(client, 300)
    }

    fn account(user_id: &str, expires_in_seconds: i64, refresh: Option<&str>) -> CachedAccount {
        CachedAccount {
            user_id: user_id.into(),
            access_token: "cached-access-token".into(),
            refresh_token: refresh.map(str::to_string),
            expires_at: Utc::now() + Duration::seconds(expires_in_seconds),
            scope: "User.Read".into(),
        }
    }

    #[tokio::test]
    async fn test_unknown_user_yields_token_not_found() {
        let provider = provider();
        let err = provider.get_user_access_token("nobody").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenNotFound));
        assert_eq!(err.code(), "TokenNotFound");
    }

    #[tokio::test]
    async fn test_valid_cached_account_returns_token() {
        let provider = provider();
        provider
            .cache
            .insert(account("user-1", 3600, Some("refresh")))
            .await;

        let token = provider.get_user_access_token("user-1").await.unwrap();
        assert_eq!(token, "cached-access-token");
    }

    #[tokio::test]
    async fn test_failed_refresh_yields_authentication_failure() {
        let provider = provider_with_dead_endpoint();
        // Token already inside the refresh window, forcing a refresh attempt.
        provider
            .cache
            .insert(account("user-1", 10, Some("refresh")))
            .await;

        let err = provider.get_user_access_token("user-1").await.unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailure));
        assert_eq!(err.code(), "AuthenticationFailure");

        // The stale record was evicted; subsequent calls see an empty cache.
        let err = provider.get_user_access_token("user-1").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenNotFound));
    }

    #[tokio::test]
    async fn test_expired_account_without_refresh_token_fails() {
        let provider = provider();
        provider.cache.insert(account("user-1", -10, None)).await;

        let err = provider.get_user_access_token("user-1").await.unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailure));
    }

    #[tokio::test]
    async fn test_code_exchange_failure_propagates_unmodified() {
        let provider = provider_with_dead_endpoint();
        let err = provider
            .get_user_access_token_by_authorization_code("dead-code")
            .await
            .unwrap_err();
        // Not translated to AuthenticationFailure: the exchange path
        // surfaces the underlying failure as-is.
        assert!(matches!(err, AuthError::TokenExchangeFailed(_)));
    }

    #[test]
    fn test_authority_passthrough() {
        let provider = provider();
        assert_eq!(
            provider.authority(),
            "https://login.microsoftonline.com/test-tenant"
        );
    }
}
