//! Subscription discovery on the management API.

use serde::{Deserialize, Serialize};

use crate::auth::AccessToken;
use crate::{Error, Result};

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const SUBSCRIPTIONS_API_VERSION: &str = "2020-01-01";

/// A subscription visible to the signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl Subscription {
    /// Display name, or the id when the API omitted one.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.subscription_id)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionList {
    #[serde(default)]
    value: Vec<RawSubscription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSubscription {
    #[serde(default)]
    subscription_id: Option<String>,
    #[serde(default, rename = "subscriptionID")]
    subscription_id_upper: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl RawSubscription {
    fn normalize(self) -> Option<Subscription> {
        let from_path = self
            .id
            .as_deref()
            .and_then(|id| id.split('/').nth(2))
            .map(str::to_string);
        let subscription_id = [self.subscription_id, self.subscription_id_upper, from_path]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())?;

        Some(Subscription {
            subscription_id,
            display_name: self.display_name.or(self.name),
            state: self.state,
        })
    }
}

/// Client for `GET /subscriptions`.
#[derive(Debug, Clone)]
pub struct SubscriptionClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SubscriptionClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_endpoint(http, DEFAULT_MANAGEMENT_ENDPOINT)
    }

    pub fn with_endpoint(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Subscriptions visible to `token`. Entries without an id are dropped.
    pub async fn list(&self, token: &AccessToken) -> Result<Vec<Subscription>> {
        let response = self
            .http
            .get(format!("{}/subscriptions", self.endpoint))
            .query(&[("api-version", SUBSCRIPTIONS_API_VERSION)])
            .header(reqwest::header::AUTHORIZATION, token.bearer())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: format!("Failed to list subscriptions: {}", body),
            });
        }

        let list: SubscriptionList = serde_json::from_str(&body)?;
        let subscriptions: Vec<_> = list
            .value
            .into_iter()
            .filter_map(RawSubscription::normalize)
            .collect();
        tracing::debug!(count = subscriptions.len(), "Listed subscriptions");
        Ok(subscriptions)
    }
}

/// Case-insensitive substring match on display name or id.
pub fn filter_subscriptions(subscriptions: Vec<Subscription>, grep: Option<&str>) -> Vec<Subscription> {
    let Some(needle) = grep.filter(|g| !g.is_empty()).map(str::to_lowercase) else {
        return subscriptions;
    };
    subscriptions
        .into_iter()
        .filter(|s| {
            let name = s.display_name.as_deref().unwrap_or_default().to_lowercase();
            name.contains(&needle) || s.subscription_id.to_lowercase().contains(&needle)
        })
        .collect()
}
