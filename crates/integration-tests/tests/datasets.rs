mod harness;

use harness::config::ConfigBuilder;
use harness::mock_llm::MockLlm;
use harness::server::TestServer;
use harness::store::SeededStore;
use serde_json::json;

async fn start() -> (SeededStore, MockLlm, TestServer) {
    let store = SeededStore::create().await.unwrap();
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new(&store)
        .with_backend("primary", &mock.base_url())
        .build();

    let server = TestServer::start(config).await.unwrap();
    (store, mock, server)
}

#[tokio::test]
async fn datasets_are_listed_in_catalog_order() {
    let (_store, _mock, server) = start().await;

    let resp = server.client().get(server.url("/v1/datasets")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    let ids: Vec<_> = body["datasets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|dataset| dataset["id"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(ids, ["topProducts", "cancelledOrders"]);
}

#[tokio::test]
async fn dataset_is_fetched_with_filters() {
    let (_store, mock, server) = start().await;

    let resp = server
        .client()
        .post(server.url("/v1/datasets/cancelledOrders"))
        .json(&json!({"filters": {"province": "Banten"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["id"], "cancelledOrders");
    assert_eq!(body["filters"], json!({"province": "Banten"}));
    assert_eq!(body["rows"], json!([{"province": "Banten", "total": 15.0}]));
    assert_eq!(mock.completion_count(), 0);
}

#[tokio::test]
async fn unknown_dataset_is_not_found() {
    let (_store, _mock, server) = start().await;

    let resp = server
        .client()
        .post(server.url("/v1/datasets/churn"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "unknown_dataset");
}

#[tokio::test]
async fn unknown_filter_key_is_rejected() {
    let (_store, _mock, server) = start().await;

    let resp = server
        .client()
        .post(server.url("/v1/datasets/topProducts"))
        .json(&json!({"filters": {"colour": "red"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "invalid_filter");
}

#[tokio::test]
async fn schema_is_introspected() {
    let (_store, _mock, server) = start().await;

    let resp = server.client().get(server.url("/v1/schema")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    let tables: Vec<_> = body["tables"]
        .as_array()
        .unwrap()
        .iter()
        .map(|table| table["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(tables, ["order_items", "orders", "products"]);
    assert!(body["summary"].as_str().unwrap().contains("orders"));
}
