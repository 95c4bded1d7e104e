//! Confidential client for Azure AD authentication.
//!
//! Proves the application's identity to the token endpoint with a client
//! assertion: an RS256 JWT signed by the app certificate's private key, with
//! the certificate thumbprint in the `x5t` header.

use crate::auth::cert_store::StoredCertificate;
use crate::config::AzureAdOptions;
use crate::error::AuthError;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::Rng;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use url::Url;
use uuid::Uuid;
use zeroize::Zeroize;

/// HTTP request timeout.
const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Lifetime of a client assertion JWT.
const ASSERTION_LIFETIME_MINUTES: i64 = 5;

/// Claims for the Azure AD client assertion JWT.
#[derive(Debug, serde::Serialize)]
struct AssertionClaims {
    iss: String,
    sub: String,
    aud: String,
    jti: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

/// Confidential client bound to one app registration and certificate.
pub struct ConfidentialClient {
    client_id: String,
    redirect_uri: String,
    scopes: Vec<String>,
    authority: String,
    authorize_endpoint: String,
    token_endpoint: String,
    /// base64url(SHA-1(certificate DER)), carried in the assertion header.
    x5t: String,
    encoding_key: EncodingKey,
    http_client: reqwest::Client,
}

impl ConfidentialClient {
    /// Create a confidential client from configuration, the store certificate
    /// and its private key PEM.
    pub fn new(
        options: &AzureAdOptions,
        certificate: &StoredCertificate,
        private_key_pem: &[u8],
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;

        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .context("Failed to load RSA private key for client assertion")?;

        let x5t = URL_SAFE_NO_PAD.encode(Sha1::digest(&certificate.der));

        let authority = format!(
            "https://login.microsoftonline.com/{}",
            options.tenant_id
        );

        Ok(Self {
            client_id: options.client_id.clone(),
            redirect_uri: options.redirect_uri(),
            scopes: options.scopes(),
            authorize_endpoint: format!("{}/oauth2/v2.0/authorize", authority),
            token_endpoint: format!("{}/oauth2/v2.0/token", authority),
            authority,
            x5t,
            encoding_key,
            http_client,
        })
    }

    /// The authority URL this client was built against.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Point the client at a different token endpoint. Test hook.
    #[cfg(test)]
    pub(crate) fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    /// Generate the authorization URL for browser-based sign-in.
    ///
    /// Returns the URL and a CSRF state token that must be verified in the callback.
    pub fn generate_auth_url(&self) -> (Url, String) {
        // Random state for CSRF protection
        let mut rng = rand::thread_rng();
        let state_bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
        let state = URL_SAFE_NO_PAD.encode(&state_bytes);

        let mut url = Url::parse(&self.authorize_endpoint).expect("Invalid authorize endpoint");

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", &state);

        (url, state)
    }

    /// Build the signed client assertion JWT.
    ///
    /// Claims follow the Azure AD contract: iss/sub are the client id, aud is
    /// the v2.0 token authority, jti a fresh UUID, with a short lifetime.
    pub fn build_client_assertion(&self) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.x5t = Some(self.x5t.clone());

        let now = Utc::now();
        let claims = AssertionClaims {
            iss: self.client_id.clone(),
            sub: self.client_id.clone(),
            aud: format!("{}/v2.0", self.authority),
            jti: Uuid::new_v4().to_string(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(ASSERTION_LIFETIME_MINUTES)).timestamp(),
        };

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::AssertionFailed(e.to_string()))
    }

    /// Exchange an authorization code for tokens.
    pub async fn redeem_authorization_code(&self, code: &str) -> Result<TokenResponse, AuthError> {
        let assertion = self.build_client_assertion()?;

        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", &self.scopes.join(" ")),
            (
                "client_assertion_type",
                "urn:ietf:params:oauth:client-assertion-type:jwt-bearer",
            ),
            ("client_assertion", &assertion),
        ];

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            // Log error details for debugging (doesn't expose to user)
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Token exchange failed: HTTP {} - {}", status, error_body);
            return Err(AuthError::TokenExchangeFailed(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        Ok(token_response)
    }

    /// Redeem a refresh token for a new token set.
    pub async fn redeem_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, AuthError> {
        let assertion = self.build_client_assertion()?;

        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", &self.scopes.join(" ")),
            (
                "client_assertion_type",
                "urn:ietf:params:oauth:client-assertion-type:jwt-bearer",
            ),
            ("client_assertion", &assertion),
        ];

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            // Log error details for debugging (doesn't expose to user)
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Token refresh failed: HTTP {} - {}", status, error_body);
            return Err(AuthError::TokenRefreshFailed(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

        Ok(token_response)
    }
}

/// Token response from Azure AD.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: String,
}

impl Zeroize for TokenResponse {
    fn zeroize(&mut self) {
        self.access_token.zeroize();
        if let Some(ref mut rt) = self.refresh_token {
            rt.zeroize();
        }
        if let Some(ref mut it) = self.id_token {
            it.zeroize();
        }
    }
}

impl Drop for TokenResponse {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl TokenResponse {
    /// Extract the home account id from the id token, MSAL-style: the `oid`
    /// and `tid` claims joined with a dot, falling back to `sub` when either
    /// is absent. The payload is base64url-decoded locally without signature
    /// verification; the token came straight from the authority over TLS.
    pub fn home_account_id(&self) -> Option<String> {
        let id_token = self.id_token.as_deref()?;
        let claims = decode_jwt_payload(id_token)?;

        let oid = claims.get("oid").and_then(|v| v.as_str());
        let tid = claims.get("tid").and_then(|v| v.as_str());

        match (oid, tid) {
            (Some(oid), Some(tid)) => Some(format!("{}.{}", oid, tid)),
            _ => claims
                .get("sub")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }
}

/// Decode the payload segment of a JWT without verifying the signature.
fn decode_jwt_payload(token: &str) -> Option<serde_json::Value> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    let payload_bytes = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    serde_json::from_slice(&payload_bytes).ok()
}

/// Parse an OAuth callback query string to extract code and state.
pub fn parse_callback_query(query: &str) -> Result<(String, String), AuthError> {
    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    // Check for error response
    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .cloned()
            .unwrap_or_else(|| error.clone());
        return Err(AuthError::OAuthFailed(description));
    }

    let code = params.get("code").ok_or(AuthError::InvalidAuthCode)?.clone();

    let state = params
        .get("state")
        .ok_or(AuthError::StateValidationFailed)?
        .clone();

    Ok((code, state))
}
