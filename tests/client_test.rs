use mockito::{Matcher, Server};
use serde_json::json;

use quickwit_log::client::{CommitMode, DeleteQuery, IndexStatus, QuickwitClient, QuickwitError, SearchRequest};
use quickwit_log::config::QuickwitConfig;
use quickwit_log::quickwit_sink::QuickwitSink;
use quickwit_log::record::LogRecord;
use quickwit_log::sink::LogSink;

fn client_for(url: &str) -> QuickwitClient {
    let config = QuickwitConfig {
        url: url.to_string(),
        index_prefix: "logs".into(),
        ..QuickwitConfig::default()
    };
    QuickwitClient::new(&config).expect("client")
}

#[tokio::test]
async fn ingest_sends_ndjson_with_commit_mode() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/logs_shop/ingest")
        .match_query(Matcher::UrlEncoded("commit".into(), "force".into()))
        .match_header("Content-Type", "application/x-ndjson")
        .match_body("{\"message\":\"a\"}\n{\"message\":\"b\"}\n")
        .with_status(200)
        .with_body(r#"{"num_docs_for_processing": 2}"#)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let docs = vec![json!({"message": "a"}), json!({"message": "b"})];
    client
        .index_documents("logs_shop", &docs, CommitMode::Force)
        .await
        .expect("ingest");

    mock.assert_async().await;
}

#[tokio::test]
async fn empty_ingest_sends_nothing() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let docs: Vec<serde_json::Value> = Vec::new();
    client
        .index_documents("logs_shop", &docs, CommitMode::Auto)
        .await
        .expect("empty ingest");

    mock.assert_async().await;
}

#[tokio::test]
async fn missing_index_is_reported_as_not_found() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v1/indexes/logs_gone/describe")
        .with_status(404)
        .with_body("index `logs_gone` not found")
        .create_async()
        .await;

    let client = client_for(&server.url());
    match client.get_index_stats("logs_gone").await {
        Err(QuickwitError::IndexNotFound(body)) => assert!(body.contains("logs_gone")),
        other => panic!("expected IndexNotFound, got {:?}", other),
    }
    assert!(!client.index_exists("logs_gone").await.expect("exists"));
}

#[tokio::test]
async fn server_errors_keep_status_and_body() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/v1/logs_shop/ingest")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("Internal Server Error")
        .create_async()
        .await;

    let client = client_for(&server.url());
    let err = client
        .index_document("logs_shop", &json!({"message": "x"}), CommitMode::Auto)
        .await
        .unwrap_err();
    match err {
        QuickwitError::Api { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "Internal Server Error");
        }
        other => panic!("expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_server_is_a_connection_error() {
    // Nothing listens on port 1.
    let client = client_for("http://127.0.0.1:1");
    let err = client.list_indexes().await.unwrap_err();
    assert!(matches!(err, QuickwitError::Connection { .. }), "{:?}", err);
    assert!(!client.health_check().await);
}

#[tokio::test]
async fn log_index_is_created_once_when_missing() {
    let mut server = Server::new_async().await;
    let describe = server
        .mock("GET", "/api/v1/indexes/logs_shop/describe")
        .with_status(404)
        .with_body("not found")
        .expect(1)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/api/v1/indexes")
        .match_body(Matcher::PartialJson(json!({"index_id": "logs_shop"})))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server.url());
    assert_eq!(client.create_log_index("shop").await.expect("create"), IndexStatus::Created);
    // Known afterwards; no further requests.
    assert_eq!(client.create_log_index("shop").await.expect("cached"), IndexStatus::Existing);

    describe.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn existing_log_index_is_left_alone() {
    let mut server = Server::new_async().await;
    let _describe = server
        .mock("GET", "/api/v1/indexes/logs_shop/describe")
        .with_status(200)
        .with_body(r#"{"index_id": "logs_shop", "num_published_docs": 10}"#)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/api/v1/indexes")
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server.url());
    assert_eq!(client.create_log_index("shop").await.expect("exists"), IndexStatus::Existing);
    create.assert_async().await;
}

#[tokio::test]
async fn health_check_falls_back_to_readiness() {
    let mut server = Server::new_async().await;
    let _live = server
        .mock("GET", "/health/livez")
        .with_status(503)
        .create_async()
        .await;
    let ready = server
        .mock("GET", "/health/readyz")
        .with_status(200)
        .with_body("true")
        .create_async()
        .await;

    assert!(client_for(&server.url()).health_check().await);
    ready.assert_async().await;
}

#[tokio::test]
async fn search_passes_parameters_and_parses_hits() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/logs_shop/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("query".into(), "level:ERROR".into()),
            Matcher::UrlEncoded("max_hits".into(), "5".into()),
            Matcher::UrlEncoded("sort_by".into(), "-timestamp".into()),
        ]))
        .with_status(200)
        .with_body(
            json!({
                "num_hits": 1,
                "hits": [{"level": "ERROR", "message": "boom"}],
                "elapsed_time_micros": 812,
                "errors": []
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut request = SearchRequest::new("level:ERROR");
    request.max_hits = Some(5);
    request.sort_by = Some("-timestamp".into());
    let response = client_for(&server.url())
        .search("logs_shop", &request)
        .await
        .expect("search");

    assert_eq!(response.num_hits, 1);
    assert_eq!(response.hits[0]["message"], "boom");
    assert_eq!(response.elapsed_time_micros, 812);
    mock.assert_async().await;
}

#[tokio::test]
async fn delete_index_and_clear_use_index_paths() {
    let mut server = Server::new_async().await;
    let delete = server
        .mock("DELETE", "/api/v1/indexes/logs_shop")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    let clear = server
        .mock("PUT", "/api/v1/indexes/logs_shop/clear")
        .with_status(200)
        .create_async()
        .await;

    let client = client_for(&server.url());
    client.delete_index("logs_shop").await.expect("delete");
    client.clear_index("logs_shop").await.expect("clear");

    delete.assert_async().await;
    clear.assert_async().await;
}

#[tokio::test]
async fn ingest_file_posts_file_contents() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/logs_shop/ingest")
        .match_query(Matcher::UrlEncoded("commit".into(), "wait_for".into()))
        .match_body("{\"message\":\"from file\"}\n")
        .with_status(200)
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("batch.ndjson");
    std::fs::write(&path, "{\"message\":\"from file\"}\n").expect("write");

    client_for(&server.url())
        .ingest_file("logs_shop", &path, CommitMode::WaitFor)
        .await
        .expect("ingest file");
    mock.assert_async().await;

    let missing = client_for(&server.url())
        .ingest_file("logs_shop", dir.path().join("nope.ndjson"), CommitMode::Auto)
        .await
        .unwrap_err();
    assert!(matches!(missing, QuickwitError::Io { .. }));
}

#[tokio::test]
async fn sink_recreates_an_index_deleted_elsewhere() {
    let mut server = Server::new_async().await;
    let describe_ok = server
        .mock("GET", "/api/v1/indexes/logs_shop/describe")
        .with_status(200)
        .with_body(r#"{"index_id": "logs_shop"}"#)
        .expect(1)
        .create_async()
        .await;
    let ingest_missing = server
        .mock("POST", "/api/v1/logs_shop/ingest")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body("index `logs_shop` not found")
        .expect(1)
        .create_async()
        .await;

    let sink = QuickwitSink::new(client_for(&server.url()), "shop");
    let records = vec![LogRecord::new("INFO", "shop", "first")];
    assert!(sink.send_batch(&records, CommitMode::Auto).await.is_err());

    describe_ok.assert_async().await;
    ingest_missing.assert_async().await;
    describe_ok.remove_async().await;
    ingest_missing.remove_async().await;

    // The index is gone now: the next batch must look again and create it.
    let describe_missing = server
        .mock("GET", "/api/v1/indexes/logs_shop/describe")
        .with_status(404)
        .with_body("not found")
        .expect(1)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/api/v1/indexes")
        .match_body(Matcher::PartialJson(json!({"index_id": "logs_shop"})))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;
    let ingest_ok = server
        .mock("POST", "/api/v1/logs_shop/ingest")
        .match_query(Matcher::Any)
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    sink.send_batch(&records, CommitMode::Auto).await.expect("recovered");

    describe_missing.assert_async().await;
    create.assert_async().await;
    ingest_ok.assert_async().await;
}

#[tokio::test]
async fn delete_task_posts_the_query() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/indexes/logs_shop/delete-tasks")
        .match_header("Content-Type", "application/json")
        .match_body(Matcher::Json(json!({
            "query": "level:DEBUG",
            "search_field": ["level"],
            "end_timestamp": 1714560000
        })))
        .with_status(200)
        .with_body(r#"{"opstamp": 3, "delete_query": {"index_uid": "logs_shop:01"}}"#)
        .create_async()
        .await;

    let query = DeleteQuery {
        query: "level:DEBUG".into(),
        search_field: Some(vec!["level".into()]),
        end_timestamp: Some(1714560000),
        ..DeleteQuery::default()
    };
    let task = client_for(&server.url())
        .create_delete_task("logs_shop", &query)
        .await
        .expect("delete task");

    assert_eq!(task["opstamp"], 3);
    mock.assert_async().await;
}

#[tokio::test]
async fn list_indexes_returns_index_metadata() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v1/indexes")
        .with_status(200)
        .with_body(
            json!([
                {"index_config": {"index_id": "logs_shop"}},
                {"index_config": {"index_id": "logs_billing"}}
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let indexes = client_for(&server.url()).list_indexes().await.expect("list");
    let ids: Vec<&str> = indexes
        .iter()
        .filter_map(|index| index.pointer("/index_config/index_id").and_then(|id| id.as_str()))
        .collect();
    assert_eq!(ids, vec!["logs_shop", "logs_billing"]);
}
