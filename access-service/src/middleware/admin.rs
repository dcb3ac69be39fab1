use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use subtle::ConstantTimeEq;

/// Guard for the admin surface: requires the deployment admin API key in
/// `X-Admin-Api-Key`. The comparison is constant-time.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let api_key = headers
        .get("X-Admin-Api-Key")
        .and_then(|value| value.to_str().ok());

    let expected = state.config.security.admin_api_key.as_bytes();
    let valid = api_key
        .map(|key| key.as_bytes().ct_eq(expected).into())
        .unwrap_or(false);

    if valid {
        next.run(request).await
    } else {
        tracing::warn!("Failed admin authentication attempt");
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized: Invalid or missing admin API key" })),
        )
            .into_response()
    }
}
