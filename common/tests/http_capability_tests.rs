// HTTP tests for the Reddit client and notification sender against mock servers

use common::credentials::RedditCredentials;
use common::errors::{FetchError, NotifyError};
use common::notifier::{HttpNotificationSender, NotificationSender};
use common::reddit::{PostFetcher, RedditClient, RedditClientConfig};
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> RedditCredentials {
    RedditCredentials {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        user_agent: "reddit-monitor-tests/1.0".to_string(),
        username: "user".to_string(),
        password: "pass".to_string(),
    }
}

fn client_for(server: &MockServer) -> RedditClient {
    let config = RedditClientConfig {
        api_base_url: server.uri(),
        auth_base_url: server.uri(),
        timeout_seconds: 5,
    };
    RedditClient::new(config, credentials()).unwrap()
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .and(header_exists("authorization"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-123",
            "token_type": "bearer",
            "expires_in": 3600,
            "scope": "*"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn listing() -> serde_json::Value {
    json!({
        "kind": "Listing",
        "data": {
            "after": null,
            "children": [
                {"kind": "t3", "data": {
                    "id": "abc", "title": "[H] GPU [W] PayPal", "url": "https://i.redd.it/a.jpg",
                    "score": 12, "permalink": "/r/hardwareswap/comments/abc/", "domain": "i.redd.it",
                    "link_flair_text": "SELLING", "author": "seller", "created_utc": 1700000000.0
                }},
                {"kind": "t3", "data": {
                    "id": "def", "title": "Another post", "url": "https://example.com",
                    "score": 1, "permalink": "/r/hardwareswap/comments/def/", "domain": "example.com",
                    "link_flair_text": null, "author": "buyer", "created_utc": 1700000500.0
                }}
            ]
        }
    })
}

#[tokio::test]
async fn test_fetch_new_posts_authenticates_once() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/r/hardwareswap/new"))
        .and(query_param("limit", "10"))
        .and(query_param("raw_json", "1"))
        .and(header("authorization", "Bearer token-123"))
        .and(header("user-agent", "reddit-monitor-tests/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let posts = client.fetch_new_posts("hardwareswap", 10).await.unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].id, "abc");
    assert_eq!(posts[0].flair_text.as_deref(), Some("SELLING"));
    assert_eq!(posts[1].author.as_deref(), Some("buyer"));

    // Cached token is reused
    client.fetch_new_posts("hardwareswap", 10).await.unwrap();
}

#[tokio::test]
async fn test_rate_limit_maps_retry_after() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/r/busy/new"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "42"))
        .mount(&server)
        .await;

    let result = client_for(&server).fetch_new_posts("busy", 10).await;
    assert_eq!(
        result,
        Err(FetchError::RateLimited {
            retry_after_secs: Some(42)
        })
    );
}

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/r/private/new"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/missing/new"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/flaky/new"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(matches!(
        client.fetch_new_posts("private", 10).await,
        Err(FetchError::Forbidden(_))
    ));
    assert!(matches!(
        client.fetch_new_posts("missing", 10).await,
        Err(FetchError::NotFound(_))
    ));
    match client.fetch_new_posts("flaky", 10).await {
        Err(FetchError::Http(message)) => assert!(message.contains("upstream down")),
        other => panic!("expected http error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unauthorized_drops_cached_token() {
    let server = MockServer::start().await;
    mount_token(&server, 2).await;
    Mock::given(method("GET"))
        .and(path("/r/test/new"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(matches!(
        client.fetch_new_posts("test", 10).await,
        Err(FetchError::Unauthorized(_))
    ));
    assert!(matches!(
        client.fetch_new_posts("test", 10).await,
        Err(FetchError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_token_error_body_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    match client_for(&server).fetch_new_posts("test", 10).await {
        Err(FetchError::Unauthorized(reason)) => assert_eq!(reason, "invalid_grant"),
        other => panic!("expected unauthorized, got {:?}", other),
    }
}

#[tokio::test]
async fn test_webhook_delivery_posts_title_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_json(json!({"title": "Reddit Alert: r/test", "body": "Match found"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sender = HttpNotificationSender::new(5).unwrap();
    let target = format!("{}/hook", server.uri());
    assert!(
        sender
            .send("Reddit Alert: r/test", "Match found", &[target])
            .await
    );
}

#[tokio::test]
async fn test_json_scheme_maps_to_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let sender = HttpNotificationSender::new(5).unwrap();
    let target = format!("{}/notify", server.uri()).replacen("http://", "json://", 1);
    sender.deliver(&target, "t", "b").await.unwrap();
}

#[tokio::test]
async fn test_ntfy_sends_title_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .and(header("title", "Reddit Alert: r/test"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let sender = HttpNotificationSender::new(5).unwrap();
    let target = format!("{}/alerts", server.uri()).replacen("http://", "ntfy://", 1);
    sender
        .deliver(&target, "Reddit Alert: r/test", "body")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_partial_delivery_counts_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fail"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let sender = HttpNotificationSender::new(5).unwrap();
    let ok = format!("{}/ok", server.uri());
    let fail = format!("{}/fail", server.uri());

    assert!(matches!(
        sender.deliver(&fail, "t", "b").await,
        Err(NotifyError::Rejected { status: 500 })
    ));
    assert!(
        sender
            .send("t", "b", &[fail.clone(), "bogus://x".to_string(), ok])
            .await
    );
    assert!(!sender.send("t", "b", &[fail]).await);
}
