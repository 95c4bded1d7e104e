//! Error types for the graph-connect service.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use thiserror::Error;

/// Top-level application error type.
#[derive(Error, Debug)]
#[allow(dead_code)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Certificate store error: {0}")]
    CertStore(#[from] CertStoreError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authentication-related errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No cached account exists for the user, typically because an in-memory
    /// cache was cleared by a process restart.
    #[error("User not found in token cache. Maybe the server was restarted.")]
    TokenNotFound,

    /// Silent token acquisition failed (expired refresh token, revoked
    /// consent, network failure). Coarse by design: the caller's only
    /// recourse is to send the user back through interactive sign-in.
    #[error("Caller needs to authenticate. Unable to retrieve the access token silently.")]
    AuthenticationFailure,

    #[error("OAuth2 authorization failed: {0}")]
    OAuthFailed(String),

    #[error("Invalid authorization code")]
    InvalidAuthCode,

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Client assertion signing failed: {0}")]
    AssertionFailed(String),

    #[error("State validation failed (possible CSRF attack)")]
    StateValidationFailed,
}

impl AuthError {
    /// Stable error code, paired with the `Display` message, for handlers
    /// that report a structured error before redirecting to sign-in.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TokenNotFound => "TokenNotFound",
            Self::AuthenticationFailure => "AuthenticationFailure",
            Self::OAuthFailed(_) => "OAuthFailed",
            Self::InvalidAuthCode => "InvalidAuthCode",
            Self::TokenExchangeFailed(_) => "TokenExchangeFailed",
            Self::TokenRefreshFailed(_) => "TokenRefreshFailed",
            Self::AssertionFailed(_) => "AssertionFailed",
            Self::StateValidationFailed => "StateValidationFailed",
        }
    }

    /// Returns true if the caller should redirect the user to re-authenticate.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, Self::TokenNotFound | Self::AuthenticationFailure)
    }
}

/// Certificate store errors.
#[derive(Error, Debug)]
pub enum CertStoreError {
    #[error("No certificate with thumbprint {0} found in store")]
    NotFound(String),

    #[error("Failed to read certificate store: {0}")]
    ReadFailed(String),

    #[error("Failed to parse certificate: {0}")]
    ParseFailed(String),

    #[error("Private key missing for certificate: {0}")]
    KeyMissing(String),
}

/// API-related errors.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Graph API request failed: {0}")]
    GraphRequestFailed(String),

    #[error("Failed to parse API response: {0}")]
    ParseFailed(String),

    #[error("Unauthorized (401): Token may be expired")]
    Unauthorized,

    #[error("Forbidden (403): Insufficient permissions")]
    Forbidden,

    #[error("Rate limited (429): Too many requests")]
    RateLimited,
}
