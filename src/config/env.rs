//! Override layers: process environment and per-invocation flags.
//!
//! Both layers carry the same five settings. The environment layer reads
//! `JAYZ_`-prefixed variables; the flag layer is filled in by the caller.

pub const CLIENT_ID: &str = "JAYZ_CLIENT_ID";
pub const CLIENT_SECRET: &str = "JAYZ_CLIENT_SECRET";
pub const TENANT_ID: &str = "JAYZ_TENANT_ID";
pub const SUBSCRIPTION_ID: &str = "JAYZ_SUBSCRIPTION_ID";
pub const AUTHORITY_HOST: &str = "JAYZ_AUTHORITY_HOST";

/// One precedence layer of overridable settings.
///
/// An empty string is equivalent to "not set".
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
    pub subscription_id: Option<String>,
    pub authority_host: Option<String>,
}

impl std::fmt::Debug for Overrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overrides")
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

impl Overrides {
    /// Read the `JAYZ_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the environment layer from an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            client_id: lookup(CLIENT_ID),
            client_secret: lookup(CLIENT_SECRET),
            tenant_id: lookup(TENANT_ID),
            subscription_id: lookup(SUBSCRIPTION_ID),
            authority_host: lookup(AUTHORITY_HOST),
        }
        .cleaned()
    }

    /// Drop empty values so they never shadow a lower layer.
    pub fn cleaned(self) -> Self {
        Self {
            client_id: non_empty(self.client_id),
            client_secret: non_empty(self.client_secret),
            tenant_id: non_empty(self.tenant_id),
            subscription_id: non_empty(self.subscription_id),
            authority_host: non_empty(self.authority_host),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clone().cleaned() == Self::default()
    }

    pub fn client_id(mut self, value: impl Into<String>) -> Self {
        self.client_id = Some(value.into());
        self
    }

    pub fn client_secret(mut self, value: impl Into<String>) -> Self {
        self.client_secret = Some(value.into());
        self
    }

    pub fn tenant_id(mut self, value: impl Into<String>) -> Self {
        self.tenant_id = Some(value.into());
        self
    }

    pub fn subscription_id(mut self, value: impl Into<String>) -> Self {
        self.subscription_id = Some(value.into());
        self
    }

    pub fn authority_host(mut self, value: impl Into<String>) -> Self {
        self.authority_host = Some(value.into());
        self
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
