//! Axum request handlers for the admin endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{ErrorResponse, FieldsResponse, HealthResponse};
use common::ServiceError;
use tracing::warn;

use super::state::AppState;
use crate::registry::FieldRegistry;

/// `GET /health`: setup validation plus a fresh cipher self-test.
///
/// Returns `200 OK` when the setup is valid and the self-test passes.
/// Returns `503 Service Unavailable` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let (report, self_test) = state.guard.diagnose();
    let healthy = report.valid && self_test;

    let (status_code, status_str) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        valid: report.valid,
        self_test,
        errors: report.errors,
        warnings: report.warnings,
        key_fingerprint: state.guard.keys().fingerprint(),
        entities: state.guard.registry().len(),
    };
    (status_code, Json(body)).into_response()
}

/// `GET /fields`: every registered entity and its encrypted fields.
pub async fn list_fields(State(state): State<AppState>) -> Json<FieldsResponse> {
    Json(FieldsResponse {
        fields: state.guard.registry().list_all(),
    })
}

/// `PUT /fields/:entity/:field`: register a field. Idempotent.
pub async fn add_field(
    State(state): State<AppState>,
    Path((entity, field)): Path<(String, String)>,
) -> Response {
    if let Err(e) = validate_names(&entity, &field) {
        return error_response(&e);
    }
    state.guard.registry().add_field(&entity, &field);
    StatusCode::NO_CONTENT.into_response()
}

/// `DELETE /fields/:entity/:field`: unregister a field. Idempotent.
///
/// Existing ciphertext for the field is left as stored; reads return it
/// unchanged from then on.
pub async fn remove_field(
    State(state): State<AppState>,
    Path((entity, field)): Path<(String, String)>,
) -> Response {
    if let Err(e) = validate_names(&entity, &field) {
        return error_response(&e);
    }
    if state.guard.registry().remove_field(&entity, &field) {
        warn!(
            entity = %entity,
            field = %field,
            "field unregistered; stored ciphertext is no longer decrypted"
        );
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    error_response(&ServiceError::NotFound(
        "the requested resource does not exist".into(),
    ))
}

fn error_response(err: &ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from(err))).into_response()
}

/// Entity and field names are non-empty ASCII identifiers.
fn validate_names(entity: &str, field: &str) -> Result<(), ServiceError> {
    for (kind, name) in [("entity", entity), ("field", field)] {
        if !is_identifier(name) {
            return Err(ServiceError::BadRequest(format!(
                "{kind} name must be a non-empty identifier of letters, digits, and underscores"
            )));
        }
    }
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
