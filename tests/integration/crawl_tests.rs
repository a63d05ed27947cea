//! Integration tests for the crawl pipeline
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! fetch, extract and persist cycle end-to-end against a SQLite file.

use serde_json::json;
use state_harvest::config::{Config, ExtractorConfig, OutputConfig, PipelineConfig, UserAgentConfig};
use state_harvest::crawler::{Pipeline, NO_STATE_MESSAGE};
use state_harvest::output::export_record;
use state_harvest::state::{select_as, StatePath};
use state_harvest::storage::{RecordStatus, RecordStore};
use state_harvest::HarvestError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration writing to `db_path`
fn create_test_config(db_path: &str, max_retries: u32) -> Config {
    Config {
        pipeline: PipelineConfig {
            request_delay_ms: 10, // Very short for testing
            max_retries,
            timeout_ms: 2_000,
            max_concurrent_requests: 2,
            max_redirects: 3,
        },
        extractor: ExtractorConfig::default(),
        user_agent: UserAgentConfig::default(),
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
    }
}

fn nuxt_page(title: &str, state: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><head><title>{}</title></head><body><div id="__nuxt"></div>
        <script>window.__NUXT__={};</script></body></html>"#,
        title, state
    )
}

#[tokio::test]
async fn test_crawl_extracts_and_persists_state() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");

    Mock::given(method("GET"))
        .and(path("/standings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(nuxt_page(
            "Standings",
            r#"{"data":[{},{"standingData":{"content":{"rounds":[{"name":"R1"}]}}}],"error":null}"#,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(db_path.to_str().unwrap(), 3);
    let pipeline = Pipeline::from_config(&config).unwrap();
    let url = format!("{}/standings", mock_server.uri());

    let record = pipeline.crawl_one(&url).await.unwrap();
    assert_eq!(record.status, RecordStatus::Success);
    assert_eq!(record.title.as_deref(), Some("Standings"));

    let data = record.extracted_data.as_ref().unwrap();
    let path: StatePath = "data[1].standingData.content.rounds[0].name".parse().unwrap();
    let name: String = select_as(data, &path).unwrap();
    assert_eq!(name, "R1");

    // Stored in the database file, not only returned
    drop(pipeline);
    let storage = state_harvest::storage::open_storage(&db_path).unwrap();
    let stored = storage.latest(&url).unwrap().unwrap();
    assert_eq!(stored, record);
}

#[tokio::test]
async fn test_minified_function_payload() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");

    let payload = r#"(function(a,b){return {layout:"default",data:[{items:[a,a],total:b}],serverRendered:!0}}("x",2))"#;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(nuxt_page("Home", payload)))
        .mount(&mock_server)
        .await;

    let config = create_test_config(db_path.to_str().unwrap(), 1);
    let pipeline = Pipeline::from_config(&config).unwrap();

    let record = pipeline.crawl_one(&mock_server.uri()).await.unwrap();
    assert_eq!(
        record.extracted_data,
        Some(json!({
            "layout": "default",
            "data": [{"items": ["x", "x"], "total": 2}],
            "serverRendered": true
        }))
    );
}

#[tokio::test]
async fn test_second_crawl_does_not_refetch() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(nuxt_page("P", r#"{"data":1}"#)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(db_path.to_str().unwrap(), 3);
    let url = format!("{}/page", mock_server.uri());

    let first = Pipeline::from_config(&config).unwrap().crawl_one(&url).await.unwrap();

    // A new pipeline over the same database still sees the record
    let second = Pipeline::from_config(&config).unwrap().crawl_one(&url).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_retry_bound_and_failure_record() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = create_test_config(db_path.to_str().unwrap(), 3);
    let pipeline = Pipeline::from_config(&config).unwrap();
    let url = format!("{}/flaky", mock_server.uri());

    let err = pipeline.crawl_one(&url).await.unwrap_err();
    match err {
        HarvestError::Network { message, .. } => assert_eq!(message, "HTTP 503"),
        other => panic!("unexpected error: {other}"),
    }

    let stored = pipeline.store().lock().unwrap().latest(&url).unwrap().unwrap();
    assert_eq!(stored.status, RecordStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("HTTP 503"));

    // The failure is recorded, so the target is not retried later
    let again = pipeline.crawl_one(&url).await.unwrap();
    assert_eq!(again.status, RecordStatus::Failed);
}

#[tokio::test]
async fn test_page_without_state_is_recorded_as_failed() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");

    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>Plain</title></head><body>Hi</body></html>"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(db_path.to_str().unwrap(), 3);
    let pipeline = Pipeline::from_config(&config).unwrap();
    let url = format!("{}/plain", mock_server.uri());

    let err = pipeline.crawl_one(&url).await.unwrap_err();
    assert!(err.is_extraction());

    let stored = pipeline.store().lock().unwrap().latest(&url).unwrap().unwrap();
    assert_eq!(stored.error_message.as_deref(), Some(NO_STATE_MESSAGE));
    assert_eq!(stored.title.as_deref(), Some("Plain"));
}

#[tokio::test]
async fn test_crawl_many_continues_after_failure() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");

    Mock::given(method("GET"))
        .and(path("/u1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/u2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(nuxt_page("U2", r#"{"state":{}}"#)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(db_path.to_str().unwrap(), 1);
    let pipeline = Pipeline::from_config(&config).unwrap();
    let urls = vec![
        format!("{}/u1", mock_server.uri()),
        format!("{}/u2", mock_server.uri()),
    ];

    let results = pipeline.crawl_many(&urls).await;
    assert_eq!(results.len(), 2);
    assert!(results[0].is_none());
    assert_eq!(
        results[1].as_ref().map(|r| r.status),
        Some(RecordStatus::Success)
    );

    let stored = pipeline.store().lock().unwrap().recent(10).unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn test_redirect_limit_fails_crawl() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");

    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/loop", mock_server.uri()).as_str()),
        )
        .mount(&mock_server)
        .await;

    let config = create_test_config(db_path.to_str().unwrap(), 1);
    let pipeline = Pipeline::from_config(&config).unwrap();

    let err = pipeline
        .crawl_one(&format!("{}/loop", mock_server.uri()))
        .await
        .unwrap_err();
    assert!(err.is_network());
}

#[tokio::test]
async fn test_export_of_crawled_state() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let export_path = dir.path().join("state.json");

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(nuxt_page("E", r#"{"data":[42]}"#)))
        .mount(&mock_server)
        .await;

    let config = create_test_config(db_path.to_str().unwrap(), 1);
    let pipeline = Pipeline::from_config(&config).unwrap();
    let record = pipeline.crawl_one(&mock_server.uri()).await.unwrap();

    assert!(export_record(&record, pipeline.extractor().global_name(), &export_path).unwrap());

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&export_path).unwrap()).unwrap();
    assert_eq!(written["dataType"], "window.__NUXT__");
    assert_eq!(written["data"], json!({"data": [42]}));
    assert_eq!(written["sourceUrl"], record.source_url);
}
