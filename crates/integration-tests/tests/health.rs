mod harness;

use harness::config::ConfigBuilder;
use harness::mock_llm::MockLlm;
use harness::server::TestServer;
use harness::store::SeededStore;

#[tokio::test]
async fn health_endpoint_reports_backends_and_datasets() {
    let store = SeededStore::create().await.unwrap();
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new(&store)
        .with_backend("primary", &mock.base_url())
        .with_backend("backup", &mock.base_url())
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server.client().get(server.url("/health")).send().await.unwrap();

    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backends"], 2);
    assert_eq!(body["datasets"], 2);
    assert_eq!(mock.completion_count(), 0);
}

#[tokio::test]
async fn health_endpoint_disabled() {
    let store = SeededStore::create().await.unwrap();
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new(&store)
        .with_backend("primary", &mock.base_url())
        .without_health()
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server.client().get(server.url("/health")).send().await.unwrap();

    assert_eq!(resp.status(), 404);
}
