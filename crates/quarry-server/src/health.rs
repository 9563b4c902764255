use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use quarry_analyst::Analyst;
use serde_json::json;

/// Health check handler
pub async fn health_handler(State(analyst): State<Analyst>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "backends": analyst.client().dispatcher().len(),
        "datasets": analyst.catalog().len(),
    }))
}
