use funnel_analytics::engine::{AnalysisEngine, EngineConfig};
use funnel_analytics::server::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;

/// Serves the router on an ephemeral port and returns its base url
async fn spawn_server() -> String {
    let engine = AnalysisEngine::with_default_rules(EngineConfig::default()).unwrap();
    let app = create_router(Arc::new(AppState::new(engine)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn graph() -> Value {
    json!({
        "nodes": [
            {"id": "A", "is_entry": true},
            {"id": "B1"}, {"id": "B2"}, {"id": "B3"},
            {"id": "C", "is_absorbing": true}
        ],
        "edges": [
            {"from": "A", "to": "B1", "p": {"mean": 0.3}},
            {"from": "A", "to": "B2", "p": {"mean": 0.5}},
            {"from": "A", "to": "B3", "p": {"mean": 0.2}},
            {"from": "B1", "to": "C", "p": {"mean": 1.0}},
            {"from": "B2", "to": "C", "p": {"mean": 1.0}},
            {"from": "B3", "to": "C", "p": {"mean": 1.0}}
        ]
    })
}

#[tokio::test]
async fn health_and_rule_listing() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let rules: Value = client
        .get(format!("{}/analysis-types", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<&str> = rules["analysis_types"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["id"].as_str())
        .collect();
    assert_eq!(ids.first(), Some(&"single_node_reach"));
    assert_eq!(ids.last(), Some(&"general_selection"));
}

#[tokio::test]
async fn analyze_returns_results() {
    let base = spawn_server().await;
    let response = reqwest::Client::new()
        .post(format!("{}/analyze", base))
        .json(&json!({
            "graph": graph(),
            "query": "from(A).to(C).visitedAny(B1,B2)",
            "scenarios": [
                {"scenario_id": "base"},
                {"scenario_id": "boost", "param_overrides": {"probability_overrides": {"B1->C": 0.5}}}
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["analysis_type"], "path_between");
    assert_eq!(body["metadata"]["pruned_edges"], json!(["A->B3"]));
    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["scenario_id"], "base");
    assert!((results[0]["probability"].as_f64().unwrap() - 1.0).abs() < 1e-9);
    // 0.375 * 0.5 + 0.625
    assert!((results[1]["probability"].as_f64().unwrap() - 0.8125).abs() < 1e-9);
}

#[tokio::test]
async fn parse_errors_are_bad_requests() {
    let base = spawn_server().await;
    let response = reqwest::Client::new()
        .post(format!("{}/analyze", base))
        .json(&json!({"graph": graph(), "query": "from(A).too(C)"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_type"], "parse_error");
    assert!(body["message"].as_str().unwrap().contains("too"));
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let base = spawn_server().await;
    let response = reqwest::Client::new()
        .post(format!("{}/analyze", base))
        .header("content-type", "application/json")
        .body("{\"query\": 1}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_type"], "validation_error");
}

#[tokio::test]
async fn parse_endpoint_echoes_structure() {
    let base = spawn_server().await;
    let body: Value = reqwest::Client::new()
        .post(format!("{}/parse", base))
        .json(&json!({"query": "from(A).to(C).exclude(B3)"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["query_parsed"]["from"], "A");
    assert_eq!(body["query_parsed"]["exclude"], json!(["B3"]));
}
