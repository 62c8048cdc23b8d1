//! Subscription Discovery Tests
//!
//! Run: cargo nextest run --test subscription_tests

use jayz::auth::AccessToken;
use jayz::{Error, SubscriptionClient, filter_subscriptions};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_list_subscriptions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .and(query_param("api-version", "2020-01-01"))
        .and(header("authorization", "Bearer mgmt-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {
                    "id": "/subscriptions/1111",
                    "subscriptionId": "1111",
                    "displayName": "Production",
                    "state": "Enabled"
                },
                {
                    "id": "/subscriptions/2222",
                    "displayName": "Dev Sandbox",
                    "state": "Disabled"
                },
                { "displayName": "Broken entry" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SubscriptionClient::with_endpoint(reqwest::Client::new(), server.uri());
    let token = AccessToken::new("mgmt-token", None);
    let subs = client.list(&token).await.unwrap();

    assert_eq!(subs.len(), 2);
    assert_eq!(subs[1].subscription_id, "2222");
    assert_eq!(subs[1].state.as_deref(), Some("Disabled"));

    let dev = filter_subscriptions(subs, Some("sandbox"));
    assert_eq!(dev.len(), 1);
    assert_eq!(dev[0].label(), "Dev Sandbox");
}

#[tokio::test]
async fn test_list_subscriptions_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": "InvalidAuthenticationToken", "message": "The access token is invalid." }
        })))
        .mount(&server)
        .await;

    let client = SubscriptionClient::with_endpoint(reqwest::Client::new(), format!("{}/", server.uri()));
    let err = client
        .list(&AccessToken::new("bad", None))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Api { status: 401, .. }));
    assert!(err.to_string().contains("InvalidAuthenticationToken"));
}
