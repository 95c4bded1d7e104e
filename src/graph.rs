//! Microsoft Graph API client for fetching the signed-in user's profile.

use crate::error::ApiError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Microsoft Graph API client.
pub struct GraphClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl GraphClient {
    /// Create a new Graph client against the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.into(),
            http_client,
        })
    }

    /// Fetch the current user's profile.
    pub async fn get_user_profile(&self, access_token: &str) -> Result<UserProfile, ApiError> {
        let url = format!("{}/me", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ApiError::GraphRequestFailed(e.to_string()))?;

        match response.status().as_u16() {
            200 => {
                let profile: UserProfile = response
                    .json()
                    .await
                    .map_err(|e| ApiError::ParseFailed(e.to_string()))?;
                Ok(profile)
            }
            401 => Err(ApiError::Unauthorized),
            403 => Err(ApiError::Forbidden),
            429 => Err(ApiError::RateLimited),
            // Don't expose raw API error details - just log status code
            status => Err(ApiError::GraphRequestFailed(format!("HTTP {}", status))),
        }
    }
}

/// User profile from Microsoft Graph /me endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Unique identifier for the user.
    pub id: String,

    /// User's display name.
    pub display_name: Option<String>,

    /// User's email address.
    pub mail: Option<String>,

    /// User Principal Name (typically email-like format).
    pub user_principal_name: Option<String>,

    /// User's job title.
    pub job_title: Option<String>,

    /// User's office location.
    pub office_location: Option<String>,
}

impl UserProfile {
    /// Get the best available display name.
    pub fn display_name_or_upn(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.user_principal_name.clone())
            .unwrap_or_else(|| "Unknown User".to_string())
    }

    /// Get the best available email.
    pub fn email(&self) -> String {
        self.mail
            .clone()
            .or_else(|| self.user_principal_name.clone())
            .unwrap_or_else(|| "No email".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_profile_display_name() {
        let profile = UserProfile {
            id: "123".into(),
            display_name: Some("John Doe".into()),
            mail: Some("john@example.com".into()),
            user_principal_name: Some("john@example.com".into()),
            job_title: None,
            office_location: None,
        };

        assert_eq!(profile.display_name_or_upn(), "John Doe");
        assert_eq!(profile.email(), "john@example.com");
    }

    #[test]
    fn test_user_profile_fallback() {
        let profile = UserProfile {
            id: "123".into(),
            display_name: None,
            mail: None,
            user_principal_name: Some("user@tenant.com".into()),
            job_title: None,
            office_location: None,
        };

        assert_eq!(profile.display_name_or_upn(), "user@tenant.com");
        assert_eq!(profile.email(), "user@tenant.com");
    }

    #[test]
    fn test_profile_deserializes_graph_shape() {
        let json = r#"{
            "id": "abc-123",
            "displayName": "Test User",
            "mail": null,
            "userPrincipalName": "test@contoso.com",
            "jobTitle": "Engineer",
            "officeLocation": "18/2111"
        }"#;

        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.id, "abc-123");
        assert_eq!(profile.display_name.as_deref(), Some("Test User"));
        assert_eq!(profile.job_title.as_deref(), Some("Engineer"));
    }
}
