//! Access token handed to API callers.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};

/// Bearer token for the management API.
#[derive(Clone)]
pub struct AccessToken {
    secret: SecretString,
    expires_on: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[redacted]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_on: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: SecretString::from(secret.into()),
            expires_on,
        }
    }

    /// Raw token value.
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn expires_on(&self) -> Option<DateTime<Utc>> {
        self.expires_on
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.secret())
    }

    /// Check if token is expired.
    pub fn is_expired(&self) -> bool {
        self.expires_on
            .map(|exp| Utc::now() >= exp)
            .unwrap_or(false)
    }

    /// Check if token needs refresh (within 5 minutes of expiry).
    pub fn needs_refresh(&self) -> bool {
        self.expires_on
            .map(|exp| Utc::now() >= exp - Duration::minutes(5))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry() {
        let expired = AccessToken::new("t", Some(Utc::now() - Duration::hours(1)));
        assert!(expired.is_expired());
        assert!(expired.needs_refresh());

        let soon = AccessToken::new("t", Some(Utc::now() + Duration::minutes(2)));
        assert!(!soon.is_expired());
        assert!(soon.needs_refresh());

        let valid = AccessToken::new("t", Some(Utc::now() + Duration::hours(1)));
        assert!(!valid.is_expired());
        assert!(!valid.needs_refresh());

        let unknown = AccessToken::new("t", None);
        assert!(!unknown.is_expired());
    }

    #[test]
    fn test_bearer_and_debug() {
        let token = AccessToken::new("eyJ0eXAi", None);
        assert_eq!(token.bearer(), "Bearer eyJ0eXAi");
        assert_eq!(token.secret(), "eyJ0eXAi");
        assert!(!format!("{:?}", token).contains("eyJ0eXAi"));
    }
}
