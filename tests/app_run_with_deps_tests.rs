use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gh_org_secrets::app::{App, RunStatus};
use gh_org_secrets::app_deps::{RowSink, RowSource};
use gh_org_secrets::engine::{FetchOptions, ReconciliationEngine, ScopeFilter};
use gh_org_secrets::github::GitHubClient;
use gh_org_secrets::item::{Item, Row};
use gh_org_secrets::rate_limit::{RateLimitedClient, RetryPolicy};

struct MockRows(Vec<Row>);

impl RowSource for MockRows {
    fn read_rows(&self) -> Result<Vec<Row>> {
        Ok(self.0.clone())
    }
}

struct FailingRows;

impl RowSource for FailingRows {
    fn read_rows(&self) -> Result<Vec<Row>> {
        anyhow::bail!("rows file is unreadable")
    }
}

#[derive(Default)]
struct CollectingSink {
    rows: Mutex<Vec<Row>>,
}

impl RowSink for CollectingSink {
    fn write_items(&self, items: &[Item]) -> Result<()> {
        self.rows.lock().unwrap().extend(items.iter().map(Item::to_row));
        Ok(())
    }
}

fn engine(server: &MockServer) -> ReconciliationEngine {
    let policy = RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        ..RetryPolicy::default()
    };
    let http = RateLimitedClient::new("test-token".to_string(), Some(&server.uri()), policy).unwrap();
    ReconciliationEngine::from_client(GitHubClient::new(http, "acme".to_string()), 2)
}

fn variable_row(name: &str) -> Row {
    Row {
        item_type: "org_variable".to_string(),
        name: name.to_string(),
        value: Some("v".to_string()),
        ..Row::default()
    }
}

async fn mount_org(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/orgs/acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"login": "acme"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_update_with_deps_success_path() -> Result<()> {
    let mock_server = MockServer::start().await;
    mount_org(&mock_server).await;
    Mock::given(method("PATCH"))
        .and(path("/orgs/acme/actions/variables/REGION"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = MockRows(vec![variable_row("REGION")]);
    let status = App::update_with_deps(&engine(&mock_server), ScopeFilter::Both, &source).await?;
    assert_eq!(status, RunStatus::Success);
    assert_eq!(status.exit_code(), 0);
    Ok(())
}

#[tokio::test]
async fn test_update_with_deps_partial_failure() -> Result<()> {
    let mock_server = MockServer::start().await;
    mount_org(&mock_server).await;
    Mock::given(method("PATCH"))
        .and(path("/orgs/acme/actions/variables/GOOD"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let source = MockRows(vec![variable_row("GOOD"), variable_row("bad name")]);
    let status = App::update_with_deps(&engine(&mock_server), ScopeFilter::Both, &source).await?;
    assert_eq!(status, RunStatus::Partial);
    assert_eq!(status.exit_code(), 1);
    Ok(())
}

#[tokio::test]
async fn test_update_with_deps_fatal_when_organization_unreachable() -> Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme"))
        .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"message":"Not Found"}"#))
        .mount(&mock_server)
        .await;

    let source = MockRows(vec![variable_row("REGION")]);
    let status = App::update_with_deps(&engine(&mock_server), ScopeFilter::Both, &source).await?;
    assert_eq!(status, RunStatus::Fatal);
    assert_eq!(status.exit_code(), 2);
    Ok(())
}

#[tokio::test]
async fn test_update_with_deps_propagates_source_errors() {
    let mock_server = MockServer::start().await;
    let result = App::update_with_deps(&engine(&mock_server), ScopeFilter::Both, &FailingRows).await;
    assert!(result.is_err());
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_with_deps_writes_rows_to_sink() -> Result<()> {
    let mock_server = MockServer::start().await;
    mount_org(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/actions/variables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 1,
            "variables": [{"name": "REGION", "value": "eu-west-1", "visibility": "private"}]
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/actions/secrets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 1,
            "secrets": [{"name": "API_KEY", "visibility": "all"}]
        })))
        .mount(&mock_server)
        .await;

    let sink = CollectingSink::default();
    let options = FetchOptions {
        include_values: true,
        ..FetchOptions::default()
    };
    let status =
        App::fetch_with_deps(&engine(&mock_server), ScopeFilter::Organization, options, &sink).await?;
    assert_eq!(status, RunStatus::Success);

    let rows = sink.rows.lock().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].item_type, "org_variable");
    assert_eq!(rows[0].value.as_deref(), Some("eu-west-1"));
    assert_eq!(rows[0].visibility.as_deref(), Some("private"));
    assert_eq!(rows[1].item_type, "org_secret");
    assert!(rows[1].value.is_none());
    Ok(())
}

#[tokio::test]
async fn test_fetch_with_deps_partial_when_listing_fails() -> Result<()> {
    let mock_server = MockServer::start().await;
    mount_org(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/actions/variables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_count": 0, "variables": []})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/actions/secrets"))
        .respond_with(ResponseTemplate::new(403).set_body_string(r#"{"message":"Must have admin rights"}"#))
        .mount(&mock_server)
        .await;

    let sink = CollectingSink::default();
    let status = App::fetch_with_deps(
        &engine(&mock_server),
        ScopeFilter::Organization,
        FetchOptions::default(),
        &sink,
    )
    .await?;
    assert_eq!(status, RunStatus::Partial);
    Ok(())
}
