//! Analytics, dataset, schema and quota endpoints

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use http::StatusCode;
use quarry_analyst::{Analyst, AnalyticsRequest};
use quarry_catalog::{DatasetSpec, Filters};
use quarry_core::ErrorEnvelope;
use quarry_store::TableSchema;
use serde::{Deserialize, Serialize};

use crate::error::{error_response, rejection_response};

/// Build the analytics router
pub fn analytics_router(analyst: Analyst) -> Router {
    Router::new()
        .route("/v1/analytics", routing::post(analytics))
        .route("/v1/datasets", routing::get(list_datasets))
        .route("/v1/datasets/{id}", routing::post(fetch_dataset))
        .route("/v1/schema", routing::get(schema))
        .route("/v1/quota", routing::get(quota))
        .with_state(analyst)
}

/// Handle `POST /v1/analytics`
async fn analytics(State(analyst): State<Analyst>, body: Result<Json<AnalyticsRequest>, JsonRejection>) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(&rejection),
    };

    match analyst.answer(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Serialize)]
struct DatasetList<'a> {
    success: bool,
    datasets: Vec<&'a DatasetSpec>,
}

/// Handle `GET /v1/datasets`
async fn list_datasets(State(analyst): State<Analyst>) -> Response {
    Json(DatasetList {
        success: true,
        datasets: analyst.catalog().datasets().collect(),
    })
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatasetQuery {
    #[serde(default)]
    filters: Filters,
}

/// Handle `POST /v1/datasets/{id}`
///
/// The body is optional; without one every filter takes its default.
async fn fetch_dataset(State(analyst): State<Analyst>, Path(id): Path<String>, body: Bytes) -> Response {
    let query = if body.iter().all(u8::is_ascii_whitespace) {
        DatasetQuery::default()
    } else {
        match serde_json::from_slice::<DatasetQuery>(&body) {
            Ok(query) => query,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorEnvelope::new(format!("invalid request body: {e}"), "invalid_request")),
                )
                    .into_response();
            }
        }
    };

    match analyst.fetch_dataset(&id, &query.filters).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Serialize)]
struct SchemaResponse {
    success: bool,
    tables: Vec<TableSchema>,
    summary: String,
}

/// Handle `GET /v1/schema`
async fn schema(State(analyst): State<Analyst>) -> Response {
    match analyst.schema().await {
        Ok(tables) => Json(SchemaResponse {
            success: true,
            summary: TableSchema::summarize(&tables),
            tables,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `GET /v1/quota`
async fn quota(State(analyst): State<Analyst>) -> Response {
    Json(serde_json::json!({
        "success": true,
        "backends": analyst.client().dispatcher().snapshot(),
    }))
    .into_response()
}
