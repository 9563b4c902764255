use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use quarry_core::{ErrorEnvelope, HttpError};

/// Render a domain error as the `{ success: false, error, type }` envelope
///
/// The full error is logged; the body carries only the client message.
pub fn error_response<E: HttpError>(error: &E) -> Response {
    let status = error.status_code();

    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error_type = error.error_type(), error = %error, "request failed");
    } else {
        tracing::warn!(status = status.as_u16(), error_type = error.error_type(), error = %error, "request rejected");
    }

    (status, Json(ErrorEnvelope::from_error(error))).into_response()
}

/// Render an unreadable JSON body in the same envelope
pub fn rejection_response(rejection: &JsonRejection) -> Response {
    tracing::debug!(error = %rejection, "invalid request body");

    (
        rejection.status(),
        Json(ErrorEnvelope::new(rejection.body_text(), "invalid_request")),
    )
        .into_response()
}
