//! Token endpoint client.
//!
//! Every grant is a form-encoded POST. Non-2xx responses keep the raw
//! provider body so the operator sees exactly what was rejected.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use super::authority::{Authority, MANAGEMENT_SCOPE, delegated_scope};
use crate::{Error, Result};

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";

const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: u64 = 5;

/// Successful token endpoint response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, deserialize_with = "seconds")]
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[redacted]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl TokenResponse {
    /// Absolute expiry, `now + expires_in`. Lifetimes past the
    /// representable range read as unknown.
    pub fn expires_on(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.expires_in?).ok()?;
        now.checked_add_signed(chrono::Duration::try_seconds(secs)?)
    }
}

/// Response of the device authorization endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    #[serde(alias = "verification_url")]
    pub verification_uri: String,
    #[serde(default, deserialize_with = "seconds")]
    pub expires_in: Option<u64>,
    #[serde(default, deserialize_with = "seconds")]
    pub interval: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl DeviceCodeResponse {
    /// Instruction to show the operator.
    pub fn instructions(&self) -> String {
        match &self.message {
            Some(message) if !message.is_empty() => message.clone(),
            _ => format!(
                "To sign in, open {} and enter the code {} to authenticate.",
                self.verification_uri, self.user_code
            ),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval.unwrap_or(DEFAULT_POLL_INTERVAL))
    }
}

/// One poll of the device-code grant.
#[derive(Debug)]
pub enum DevicePoll {
    Complete(TokenResponse),
    Pending,
    SlowDown,
}

impl DevicePoll {
    /// Interval to wait before the next poll.
    pub fn next_interval(&self, current: Duration) -> Duration {
        match self {
            DevicePoll::SlowDown => current + SLOW_DOWN_STEP,
            _ => current,
        }
    }
}

/// OAuth error body.
#[derive(Debug, Default, Deserialize)]
pub struct ProviderError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ProviderError {
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    pub fn code(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Providers are inconsistent about numbers vs numeric strings here.
fn seconds<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// Failed exchange, with the status and raw body.
struct Rejected {
    status: u16,
    body: String,
}

/// Thin client for the token and device-code endpoints.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
}

impl TokenClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<std::result::Result<String, Rejected>> {
        let response = self.http.post(url).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(Ok(body))
        } else {
            Ok(Err(Rejected {
                status: status.as_u16(),
                body,
            }))
        }
    }

    /// Exchange an authorization code (PKCE, optionally confidential).
    ///
    /// An `invalid_client` rejection maps to
    /// [`Error::ConfidentialClientMismatch`].
    pub async fn exchange_code(
        &self,
        authority: &Authority,
        client_id: &str,
        client_secret: Option<&str>,
        code: &str,
        redirect_uri: &str,
        verifier: &str,
    ) -> Result<TokenResponse> {
        let scope = delegated_scope();
        let mut form = vec![
            ("client_id", client_id),
            ("scope", scope.as_str()),
            ("grant_type", GRANT_AUTHORIZATION_CODE),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
        ];
        if let Some(secret) = client_secret {
            form.push(("client_secret", secret));
        }

        tracing::debug!(authority = %authority, "Exchanging authorization code");
        match self.post_form(&authority.token_url(), &form).await? {
            Ok(body) => Ok(serde_json::from_str(&body)?),
            Err(rejected) => {
                if ProviderError::parse(&rejected.body).code() == Some("invalid_client") {
                    return Err(Error::ConfidentialClientMismatch {
                        redirect_uri: redirect_uri.to_string(),
                    });
                }
                Err(Error::TokenExchangeFailed {
                    status: rejected.status,
                    body: rejected.body,
                })
            }
        }
    }

    pub async fn refresh(
        &self,
        authority: &Authority,
        client_id: &str,
        client_secret: Option<&str>,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let scope = delegated_scope();
        let mut form = vec![
            ("client_id", client_id),
            ("scope", scope.as_str()),
            ("grant_type", GRANT_REFRESH_TOKEN),
            ("refresh_token", refresh_token),
        ];
        if let Some(secret) = client_secret {
            form.push(("client_secret", secret));
        }

        tracing::debug!(authority = %authority, "Refreshing access token");
        match self.post_form(&authority.token_url(), &form).await? {
            Ok(body) => Ok(serde_json::from_str(&body)?),
            Err(rejected) => Err(Error::RefreshFailed {
                status: rejected.status,
                body: rejected.body,
            }),
        }
    }

    pub async fn client_credentials(
        &self,
        authority: &Authority,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenResponse> {
        let form = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", MANAGEMENT_SCOPE),
            ("grant_type", GRANT_CLIENT_CREDENTIALS),
        ];

        tracing::debug!(authority = %authority, "Requesting client-credential token");
        match self.post_form(&authority.token_url(), &form).await? {
            Ok(body) => Ok(serde_json::from_str(&body)?),
            Err(rejected) => Err(Error::TokenExchangeFailed {
                status: rejected.status,
                body: rejected.body,
            }),
        }
    }

    pub async fn request_device_code(
        &self,
        authority: &Authority,
        client_id: &str,
    ) -> Result<DeviceCodeResponse> {
        let form = [("client_id", client_id), ("scope", MANAGEMENT_SCOPE)];
        match self.post_form(&authority.device_code_url(), &form).await? {
            Ok(body) => Ok(serde_json::from_str(&body)?),
            Err(rejected) => Err(Error::TokenExchangeFailed {
                status: rejected.status,
                body: rejected.body,
            }),
        }
    }

    /// Poll once. Pending states are returned, terminal errors raised.
    pub async fn poll_device_code(
        &self,
        authority: &Authority,
        client_id: &str,
        device_code: &str,
    ) -> Result<DevicePoll> {
        let form = [
            ("client_id", client_id),
            ("grant_type", GRANT_DEVICE_CODE),
            ("device_code", device_code),
        ];

        let rejected = match self.post_form(&authority.token_url(), &form).await? {
            Ok(body) => return Ok(DevicePoll::Complete(serde_json::from_str(&body)?)),
            Err(rejected) => rejected,
        };

        match ProviderError::parse(&rejected.body).code() {
            Some("authorization_pending") => Ok(DevicePoll::Pending),
            Some("slow_down") => Ok(DevicePoll::SlowDown),
            Some("expired_token") | Some("code_expired") => Err(Error::DeviceCodeExpired),
            _ => Err(Error::TokenExchangeFailed {
                status: rejected.status,
                body: rejected.body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_numeric_string() {
        let json = r#"{"access_token":"at","expires_in":"3599","ext_expires_in":3599}"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.expires_in, Some(3599));
        assert_eq!(response.refresh_token, None);

        let now = Utc::now();
        assert_eq!(
            response.expires_on(now),
            Some(now + chrono::Duration::seconds(3599))
        );
    }

    #[test]
    fn test_token_response_without_expiry() {
        let response: TokenResponse = serde_json::from_str(r#"{"access_token":"at"}"#).unwrap();
        assert_eq!(response.expires_on(Utc::now()), None);
        assert!(!format!("{:?}", response).contains("\"at\""));
    }

    #[test]
    fn test_token_response_huge_expiry() {
        let json = r#"{"access_token":"a","expires_in":10000000000000000}"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.expires_on(Utc::now()), None);

        let response = TokenResponse {
            expires_in: Some(u64::MAX),
            ..response
        };
        assert_eq!(response.expires_on(Utc::now()), None);

        let near_max = TokenResponse {
            expires_in: Some(86_400),
            ..response
        };
        assert_eq!(near_max.expires_on(DateTime::<Utc>::MAX_UTC), None);
    }

    #[test]
    fn test_device_instructions_fallback() {
        let json = r#"{
            "device_code": "dc",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 900,
            "interval": 5
        }"#;
        let response: DeviceCodeResponse = serde_json::from_str(json).unwrap();
        assert!(response.instructions().contains("ABCD-EFGH"));
        assert_eq!(response.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_slow_down_backoff() {
        let base = Duration::from_secs(5);
        assert_eq!(DevicePoll::SlowDown.next_interval(base), Duration::from_secs(10));
        assert_eq!(DevicePoll::Pending.next_interval(base), base);
    }

    #[test]
    fn test_provider_error_parse() {
        let err = ProviderError::parse(r#"{"error":"invalid_client","error_description":"AADSTS7000218"}"#);
        assert_eq!(err.code(), Some("invalid_client"));
        assert_eq!(ProviderError::parse("<html>").code(), None);
    }
}
