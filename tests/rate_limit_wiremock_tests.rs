use std::time::{Duration, Instant};

use gh_org_secrets::errors::ReconcileError;
use gh_org_secrets::rate_limit::{RateLimitedClient, RetryPolicy};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        ..RetryPolicy::default()
    }
}

fn client(server: &MockServer) -> RateLimitedClient {
    RateLimitedClient::new("test-token".to_string(), Some(&server.uri()), fast_policy()).unwrap()
}

#[tokio::test]
async fn test_server_errors_exhaust_after_five_attempts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orgs/acme"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(5)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .get_json::<Value>("/orgs/acme")
        .await
        .unwrap_err();
    match err {
        ReconcileError::ExhaustedRetries { attempts, last_error } => {
            assert_eq!(attempts, 5);
            assert!(last_error.contains("503"));
        }
        other => panic!("expected ExhaustedRetries, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/orgs/acme/actions/secrets/API_KEY"))
        .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"message":"Not Found"}"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .put("/orgs/acme/actions/secrets/API_KEY", &json!({"key_id": "k1"}))
        .await
        .unwrap_err();
    match err {
        ReconcileError::RequestRejected { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("Not Found"));
        }
        other => panic!("expected RequestRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_transient_error_then_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orgs/acme"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"login": "acme"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let org: Value = client(&mock_server).get_json("/orgs/acme").await.unwrap();
    assert_eq!(org["login"], "acme");
}

#[tokio::test]
async fn test_too_many_requests_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/orgs/acme/actions/variables/OLD"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/orgs/acme/actions/variables/OLD"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let status = client(&mock_server)
        .delete("/orgs/acme/actions/variables/OLD")
        .await
        .unwrap();
    assert_eq!(status.as_u16(), 204);
}

#[tokio::test]
async fn test_rate_limit_pause_is_shared_between_clones() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orgs/acme"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("retry-after", "1"),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"login": "acme"})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let first = client(&mock_server);
    let second = first.clone();

    let limited = async { first.get_json::<Value>("/orgs/acme").await };
    let follower = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let start = Instant::now();
        second.get_json::<Value>("/orgs/acme/repos").await.unwrap();
        start.elapsed()
    };

    let (limited, follower_elapsed) = tokio::join!(limited, follower);
    assert!(limited.is_ok());
    assert!(
        follower_elapsed >= Duration::from_millis(600),
        "second client should wait for the shared pause, waited {follower_elapsed:?}"
    );
}

#[tokio::test]
async fn test_pagination_follows_link_header() {
    let mock_server = MockServer::start().await;
    let next = format!(
        r#"<{}/orgs/acme/repos?per_page=100&type=all&page=2>; rel="next""#,
        mock_server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "c"}])))
        .expect(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .and(query_param("per_page", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .set_body_json(json!([{"name": "a"}, {"name": "b"}])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let items = client
        .get("/orgs/acme/repos", &[("type", "all")])
        .collect_items(None)
        .await
        .unwrap();
    let names: Vec<&str> = items.iter().filter_map(|v| v["name"].as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_abandoned_pagination_makes_no_further_calls() {
    let mock_server = MockServer::start().await;
    let next = format!(
        r#"<{}/orgs/acme/actions/secrets?per_page=100&page=2>; rel="next""#,
        mock_server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/orgs/acme/actions/secrets"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"secrets": []})))
        .expect(0)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/actions/secrets"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .set_body_json(json!({"total_count": 2, "secrets": [{"name": "A"}]})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);

    let untouched = client.get("/orgs/acme/actions/secrets", &[]);
    drop(untouched);

    let mut pages = client.get("/orgs/acme/actions/secrets", &[]);
    let first = pages.next_page().await.unwrap().unwrap();
    assert_eq!(first["secrets"][0]["name"], "A");
}

#[tokio::test]
async fn test_malformed_path_fails_without_retrying() {
    let mock_server = MockServer::start().await;
    let policy = RetryPolicy {
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_millis(500),
        ..RetryPolicy::default()
    };
    let client = RateLimitedClient::new("test-token".to_string(), Some(&mock_server.uri()), policy).unwrap();

    let started = Instant::now();
    let err = client.get_json::<Value>("/orgs/has space").await.unwrap_err();
    assert!(
        matches!(err, ReconcileError::InvalidRequest(_)),
        "expected InvalidRequest, got {err:?}"
    );
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_connection_failures_are_retried() {
    let client = RateLimitedClient::new(
        "test-token".to_string(),
        Some("http://127.0.0.1:1"),
        fast_policy(),
    )
    .unwrap();

    let err = client.get_json::<Value>("/orgs/acme").await.unwrap_err();
    match err {
        ReconcileError::ExhaustedRetries { attempts, .. } => assert_eq!(attempts, 5),
        other => panic!("expected ExhaustedRetries, got {other:?}"),
    }
}
