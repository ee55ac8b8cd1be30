mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{app, connect, send, FakeConnector, BAD_PING_HOST, UNREACHABLE_HOST};

#[tokio::test]
async fn health_reports_version() {
    let (app, _) = app(FakeConnector::new());
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn connect_returns_accepted() {
    let (app, _) = app(FakeConnector::new());
    let (status, body) = connect(&app, "db.local", "shop").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(
        body,
        json!({"message": "Successful connection to the database shop achieved!"})
    );
}

#[tokio::test]
async fn connect_accepts_port_as_string() {
    let (app, _) = app(FakeConnector::new());
    let (status, _) = send(
        &app,
        "POST",
        "/connect",
        Some(json!({"host": "db.local", "port": "5432", "database": "shop"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn connect_rejects_bad_parameters() {
    let (app, _) = app(FakeConnector::new());

    let (status, body) = send(
        &app,
        "POST",
        "/connect",
        Some(json!({"host": "db.local", "port": 0, "database": "shop"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid connection parameters: port must be > 0");

    let (status, body) = send(
        &app,
        "POST",
        "/connect",
        Some(json!({"host": "db.local", "port": 70000, "database": "shop"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid connection parameters: port must be <= 65535");

    let (status, body) = send(
        &app,
        "POST",
        "/connect",
        Some(json!({"host": "db.local", "port": 5432, "database": "shop", "sslmode": "on"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to decode request body"));
}

#[tokio::test]
async fn connect_failures_are_server_errors() {
    let (app, _) = app(FakeConnector::new());

    let (status, body) = connect(&app, UNREACHABLE_HOST, "shop").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("connection refused"));

    let (status, body) = connect(&app, BAD_PING_HOST, "shop").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("failed to validate database connection"));
}

#[tokio::test]
async fn validate_and_close_round_trip() {
    let (app, _) = app(FakeConnector::new());

    let (status, body) = send(&app, "GET", "/validate", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no active connection, call POST /connect first");

    connect(&app, "db.local", "shop").await;
    let (status, body) = send(&app, "GET", "/validate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Database shop connection is healthy"}));

    let (status, body) = send(&app, "POST", "/close", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Database connection closed successfully"}));

    let (status, _) = send(&app, "POST", "/close", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_close_is_a_server_error() {
    let connector = FakeConnector::new();
    connector.set_fail_close(true);
    let (app, _) = app(connector);
    connect(&app, "db.local", "shop").await;

    let (status, body) = send(&app, "POST", "/close", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("close failed"));

    let (status, _) = send(&app, "GET", "/validate", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn wrong_method_is_rejected() {
    let (app, _) = app(FakeConnector::new());
    for (method, uri) in [
        ("GET", "/connect"),
        ("POST", "/validate"),
        ("GET", "/close"),
        ("GET", "/query"),
        ("POST", "/schemas"),
    ] {
        let (status, _) = send(&app, method, uri, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
    }
}

#[tokio::test]
async fn query_without_connection() {
    let (app, _) = app(FakeConnector::new());
    let (status, body) = send(&app, "POST", "/query", Some(json!({"query": "SELECT 1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no active connection, call POST /connect first");
}

#[tokio::test]
async fn empty_query_is_rejected_before_lookup() {
    let (app, _) = app(FakeConnector::new());
    for body in [json!({"query": ""}), json!({"query": "   "}), json!({})] {
        let (status, resp) = send(&app, "POST", "/query", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "query is required");
    }
}

#[tokio::test]
async fn select_returns_columns_and_rows() {
    let (app, _) = app(FakeConnector::new());
    connect(&app, "db.local", "shop").await;

    let (status, body) = send(&app, "POST", "/query", Some(json!({"query": "SELECT 1"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"columns": ["?column?"], "rows": [{"?column?": 1}]}));

    let (status, body) = send(
        &app,
        "POST",
        "/query",
        Some(json!({"query": "SELECT name, score FROM players"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "columns": ["name", "score"],
            "rows": [
                {"name": "ada", "score": 9.5},
                {"name": "bob", "score": null}
            ]
        })
    );
}

#[tokio::test]
async fn statements_fall_back_to_exec() {
    let (app, _) = app(FakeConnector::new());
    connect(&app, "db.local", "shop").await;

    let (status, body) = send(
        &app,
        "POST",
        "/query",
        Some(json!({"query": "UPDATE users SET active = true"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"rows_affected": 3, "result": "statement executed"}));

    let (_, body) = send(
        &app,
        "POST",
        "/query",
        Some(json!({"query": "CREATE TABLE t (id int)"})),
    )
    .await;
    assert_eq!(body["rows_affected"], 0);
}

#[tokio::test]
async fn invalid_sql_reports_the_query_error() {
    let (app, _) = app(FakeConnector::new());
    connect(&app, "db.local", "shop").await;

    let (status, body) = send(&app, "POST", "/query", Some(json!({"query": "SELEC 1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("failed executing query"), "{message}");
    assert!(message.contains("syntax error at or near"), "{message}");
}

#[tokio::test]
async fn row_read_failures_are_server_errors() {
    let (app, _) = app(FakeConnector::new());
    connect(&app, "db.local", "shop").await;

    let (status, body) = send(
        &app,
        "POST",
        "/query",
        Some(json!({"query": "SELECT broken FROM t"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("failed scanning row"));
}

#[tokio::test(start_paused = true)]
async fn slow_queries_time_out() {
    let (app, _) = app(FakeConnector::new());
    connect(&app, "db.local", "shop").await;

    let (status, body) = send(
        &app,
        "POST",
        "/query",
        Some(json!({"query": "SELECT pg_sleep(60)"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn malformed_query_body() {
    let (app, _) = app(FakeConnector::new());
    connect(&app, "db.local", "shop").await;

    let (status, body) = send(&app, "POST", "/query", Some(json!({"sql": "SELECT 1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to decode request body"));
}

#[tokio::test]
async fn cors_preflight_allows_htmx_headers() {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    let (app, _) = app(FakeConnector::new());
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/query")
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "hx-request,content-type")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    let allowed = headers["access-control-allow-headers"].to_str().unwrap();
    assert!(allowed.contains("hx-request"));
    assert!(allowed.contains("content-type"));
}
