//! Identity provider endpoints.

use url::Url;

use super::pkce::PkcePair;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
/// The single resource scope tokens are requested for.
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
pub const OFFLINE_ACCESS: &str = "offline_access";

/// Per-tenant base URL of the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    base: String,
}

impl Authority {
    /// `authority_host` falls back to the public cloud when absent or empty.
    pub fn new(tenant_id: &str, authority_host: Option<&str>) -> Self {
        let host = authority_host
            .filter(|h| !h.is_empty())
            .unwrap_or(DEFAULT_AUTHORITY_HOST);
        Self {
            base: format!("{}/{}", host.trim_end_matches('/'), tenant_id),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.base)
    }

    pub fn device_code_url(&self) -> String {
        format!("{}/oauth2/v2.0/devicecode", self.base)
    }

    /// Browser URL for the authorization-code request.
    pub fn authorize_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        pkce: &PkcePair,
    ) -> Result<Url, url::ParseError> {
        let scope = format!("{} {} openid profile", MANAGEMENT_SCOPE, OFFLINE_ACCESS);
        Url::parse_with_params(
            &format!("{}/oauth2/v2.0/authorize", self.base),
            &[
                ("client_id", client_id),
                ("response_type", "code"),
                ("redirect_uri", redirect_uri),
                ("response_mode", "query"),
                ("scope", scope.as_str()),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", pkce.method()),
                ("prompt", "select_account"),
            ],
        )
    }
}

impl std::fmt::Display for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.base)
    }
}

/// Scope for code and refresh-token grants.
pub(crate) fn delegated_scope() -> String {
    format!("{} {}", MANAGEMENT_SCOPE, OFFLINE_ACCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_host() {
        let authority = Authority::new("contoso", None);
        assert_eq!(authority.as_str(), "https://login.microsoftonline.com/contoso");
        assert_eq!(
            Authority::new("contoso", Some("")).as_str(),
            "https://login.microsoftonline.com/contoso"
        );
    }

    #[test]
    fn test_sovereign_host_trailing_slashes() {
        let authority = Authority::new("t", Some("https://login.microsoftonline.us///"));
        assert_eq!(
            authority.token_url(),
            "https://login.microsoftonline.us/t/oauth2/v2.0/token"
        );
        assert_eq!(
            authority.device_code_url(),
            "https://login.microsoftonline.us/t/oauth2/v2.0/devicecode"
        );
    }

    #[test]
    fn test_authorize_url_params() {
        let authority = Authority::new("t", None);
        let pkce = PkcePair::generate();
        let url = authority
            .authorize_url("cid", "http://localhost:63265/callback", &pkce)
            .unwrap();

        assert_eq!(url.path(), "/t/oauth2/v2.0/authorize");
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "cid");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["redirect_uri"], "http://localhost:63265/callback");
        assert_eq!(params["code_challenge"], pkce.challenge);
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["prompt"], "select_account");
        assert_eq!(
            params["scope"],
            "https://management.azure.com/.default offline_access openid profile"
        );
    }
}
