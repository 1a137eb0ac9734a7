//! Bearer token authentication middleware

use axum::{
    body::Body,
    extract::{Request, State},
    Json,
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

/// Rejects requests without `Authorization: Bearer <expected_token>`
pub async fn auth_middleware(
    State(expected_token): State<String>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidFormat)?;

    if token != expected_token {
        debug!("rejected request to {} with invalid token", request.uri().path());
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

/// Rejections, answered with the same `{"error": ...}` body as [`crate::api::ApiError`]
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "missing bearer token"),
            AuthError::InvalidFormat => (
                StatusCode::UNAUTHORIZED,
                "authorization header must be 'Bearer <token>'",
            ),
            AuthError::InvalidToken => (StatusCode::FORBIDDEN, "token not accepted"),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
