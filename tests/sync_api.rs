//! End-to-end tests for the sync HTTP API

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use herdbook_server::config::Config;
use herdbook_server::db;
use herdbook_server::routes;
use herdbook_server::state::AppState;

async fn server_with(config: Config) -> TestServer {
    let pool = db::create_memory_pool().await.unwrap();
    TestServer::new(routes::app(AppState::new(config, pool))).unwrap()
}

async fn server() -> TestServer {
    server_with(Config::default()).await
}

fn create_item(id: &str, entity_id: &str, payload: Value) -> Value {
    json!({
        "id": id,
        "entityType": "ANIMAL",
        "entityId": entity_id,
        "action": "CREATE",
        "payload": payload,
        "farmId": "farm-1"
    })
}

#[tokio::test]
async fn test_health() {
    let server = server().await;

    for path in ["/health", "/api/v1/health"] {
        let response = server.get(path).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "herdbook-server");
    }
}

#[tokio::test]
async fn test_push_create_then_pull() {
    let server = server().await;

    let response = server
        .post("/api/v1/sync/push")
        .json(&json!({"items": [create_item("q-1", "cow-1", json!({"tagNumber": "A-17"}))]}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["results"][0]["id"], "q-1");
    assert_eq!(body["results"][0]["entityId"], "cow-1");
    assert_eq!(body["results"][0]["status"], "synced");
    assert_eq!(body["results"][0]["newVersion"], 1);
    assert_eq!(body["summary"], json!({"total": 1, "synced": 1, "conflicts": 0, "failed": 0}));
    assert!(body["serverTimestamp"].is_string());

    let response = server
        .post("/api/v1/sync/pull")
        .json(&json!({"farmId": "farm-1"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    let changes = body["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["entityType"], "ANIMAL");
    assert_eq!(changes[0]["entityId"], "cow-1");
    assert_eq!(changes[0]["action"], "update");
    assert_eq!(changes[0]["version"], 1);
    assert_eq!(changes[0]["data"]["tagNumber"], "A-17");
    assert_eq!(changes[0]["data"]["farmId"], "farm-1");
    assert_eq!(body["hasMore"], false);
}

#[tokio::test]
async fn test_stale_update_reports_conflict() {
    let server = server().await;

    server
        .post("/api/v1/sync/push")
        .json(&json!({"items": [create_item("q-1", "cow-1", json!({"name": "Daisy"}))]}))
        .await;

    let update = |id: &str, name: &str| {
        json!({
            "id": id,
            "entityType": "ANIMAL",
            "entityId": "cow-1",
            "action": "UPDATE",
            "payload": {"name": name},
            "clientVersion": 1,
            "farmId": "farm-1"
        })
    };

    // Two devices edited version 1; the second one loses
    let first: Value = server
        .post("/api/v1/sync/push")
        .json(&json!({"items": [update("q-2", "Bella")]}))
        .await
        .json();
    assert_eq!(first["results"][0]["status"], "synced");
    assert_eq!(first["results"][0]["newVersion"], 2);

    let second: Value = server
        .post("/api/v1/sync/push")
        .json(&json!({"items": [update("q-3", "Rosie")]}))
        .await
        .json();
    let result = &second["results"][0];
    assert_eq!(result["status"], "conflict");
    assert_eq!(result["serverVersion"], 2);
    assert_eq!(result["serverData"]["name"], "Bella");
    assert!(result.get("newVersion").is_none());
    assert!(result.get("errorMessage").is_none());
    assert_eq!(second["summary"]["conflicts"], 1);
}

#[tokio::test]
async fn test_mixed_batch_keeps_order_and_isolation() {
    let server = server().await;

    let body: Value = server
        .post("/api/v1/sync/push")
        .json(&json!({"items": [
            create_item("q-1", "cow-1", json!({})),
            {
                "id": "q-2",
                "entityType": "SPACESHIP",
                "entityId": "x",
                "action": "CREATE",
                "farmId": "farm-1"
            },
            {
                "id": "q-3",
                "entityType": "ANIMAL",
                "entityId": "cow-1",
                "action": "ARCHIVE",
                "farmId": "farm-1"
            },
            create_item("q-4", "cow-2", json!({})),
        ]}))
        .await
        .json();

    let statuses: Vec<&str> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["synced", "failed", "failed", "synced"]);
    assert_eq!(body["results"][1]["errorMessage"], "Unknown entity type");
    assert_eq!(body["results"][2]["errorMessage"], "Unknown action");
    assert_eq!(body["summary"], json!({"total": 4, "synced": 2, "conflicts": 0, "failed": 2}));
}

#[tokio::test]
async fn test_delete_appears_in_feed() {
    let server = server().await;

    server
        .post("/api/v1/sync/push")
        .json(&json!({"items": [create_item("q-1", "cow-1", json!({}))]}))
        .await;

    let body: Value = server
        .post("/api/v1/sync/push")
        .json(&json!({"items": [{
            "id": "q-2",
            "entityType": "ANIMAL",
            "entityId": "cow-1",
            "action": "DELETE",
            "farmId": "farm-1"
        }]}))
        .await
        .json();
    assert_eq!(body["results"][0]["status"], "synced");
    assert_eq!(body["results"][0]["newVersion"], 2);

    let body: Value = server
        .post("/api/v1/sync/pull")
        .json(&json!({"farmId": "farm-1", "entityTypes": ["ANIMAL"]}))
        .await
        .json();
    let change = &body["changes"][0];
    assert_eq!(change["action"], "delete");
    assert_eq!(change["version"], 2);
    assert!(change["data"]["deletedAt"].is_string());
}

#[tokio::test]
async fn test_update_after_delete_is_synced() {
    let server = server().await;

    let body: Value = server
        .post("/api/v1/sync/push")
        .json(&json!({"items": [
            create_item("q-1", "cow-1", json!({})),
            {
                "id": "q-2",
                "entityType": "ANIMAL",
                "entityId": "cow-1",
                "action": "DELETE",
                "clientVersion": 1,
                "farmId": "farm-1"
            },
            {
                "id": "q-3",
                "entityType": "ANIMAL",
                "entityId": "cow-1",
                "action": "UPDATE",
                "payload": {"name": "Daisy"},
                "clientVersion": 2,
                "farmId": "farm-1"
            },
        ]}))
        .await
        .json();

    assert_eq!(body["results"][2]["status"], "synced");
    assert_eq!(body["results"][2]["newVersion"], 3);
    assert_eq!(body["summary"]["synced"], 3);
}

#[tokio::test]
async fn test_pull_is_farm_scoped() {
    let server = server().await;

    server
        .post("/api/v1/sync/push")
        .json(&json!({"items": [create_item("q-1", "cow-1", json!({}))]}))
        .await;

    let body: Value = server
        .post("/api/v1/sync/pull")
        .json(&json!({"farmId": "farm-2"}))
        .await
        .json();
    assert_eq!(body["changes"], json!([]));
    assert_eq!(body["hasMore"], false);
}

#[tokio::test]
async fn test_pull_pages_with_cursor() {
    let mut config = Config::default();
    config.sync.pull_page_size = 2;
    let server = server_with(config).await;

    let items: Vec<Value> = (1..=3)
        .map(|n| create_item(&format!("q-{}", n), &format!("cow-{}", n), json!({})))
        .collect();
    server
        .post("/api/v1/sync/push")
        .json(&json!({ "items": items }))
        .await;

    let first: Value = server
        .post("/api/v1/sync/pull")
        .json(&json!({"farmId": "farm-1"}))
        .await
        .json();
    assert_eq!(first["changes"].as_array().unwrap().len(), 2);
    assert_eq!(first["hasMore"], true);
    let cursor = first["nextCursor"].as_str().unwrap().to_string();

    let second: Value = server
        .post("/api/v1/sync/pull")
        .json(&json!({"farmId": "farm-1", "cursor": cursor}))
        .await
        .json();
    let changes = second["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(second["hasMore"], false);

    let mut seen: Vec<&str> = first["changes"]
        .as_array()
        .unwrap()
        .iter()
        .chain(changes.iter())
        .map(|c| c["entityId"].as_str().unwrap())
        .collect();
    seen.sort();
    assert_eq!(seen, vec!["cow-1", "cow-2", "cow-3"]);
}

#[tokio::test]
async fn test_pull_rejects_malformed_cursor() {
    let server = server().await;

    let response = server
        .post("/api/v1/sync/pull")
        .json(&json!({"farmId": "farm-1", "cursor": "not-a-cursor"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logs_list_push_batches() {
    let server = server().await;

    server
        .post("/api/v1/sync/push")
        .json(&json!({"items": [create_item("q-1", "cow-1", json!({}))]}))
        .await;
    server
        .post("/api/v1/sync/push")
        .json(&json!({"items": [create_item("q-2", "cow-1", json!({}))]}))
        .await;

    let logs: Value = server.get("/api/v1/sync/logs/farm-1").await.json();
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l["syncType"] == "push" && l["itemsCount"] == 1));
    assert_eq!(
        logs.iter().map(|l| l["conflictCount"].as_i64().unwrap()).sum::<i64>(),
        1
    );

    let limited: Value = server
        .get("/api/v1/sync/logs/farm-1")
        .add_query_param("limit", 1)
        .await
        .json();
    assert_eq!(limited.as_array().unwrap().len(), 1);

    let other: Value = server.get("/api/v1/sync/logs/farm-2").await.json();
    assert_eq!(other, json!([]));
}

#[tokio::test]
async fn test_empty_push_writes_no_log() {
    let server = server().await;

    let body: Value = server
        .post("/api/v1/sync/push")
        .json(&json!({"items": []}))
        .await
        .json();
    assert_eq!(body["results"], json!([]));
    assert_eq!(body["summary"]["total"], 0);

    let logs: Value = server.get("/api/v1/sync/logs/farm-1").await.json();
    assert_eq!(logs, json!([]));
}
