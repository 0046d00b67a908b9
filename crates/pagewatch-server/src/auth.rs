use std::sync::Arc;

use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::dto::ErrorResponse;
use crate::state::AppState;

fn token_matches(token: &str, api_key: &str) -> bool {
    token.as_bytes().ct_eq(api_key.as_bytes()).into()
}

/// Middleware that validates `Authorization: Bearer <token>` against the configured API key.
pub async fn require_api_key<F, S, C>(
    State(state): State<Arc<AppState<F, S, C>>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response
where
    F: Send + Sync + 'static,
    S: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    let authenticated = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token_matches(token, &state.api_key));

    if !authenticated {
        let body = ErrorResponse {
            error: "unauthorized".to_string(),
            message: "Missing or invalid Authorization header. Expected: Bearer <api_key>"
                .to_string(),
        };
        return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
    }

    next.run(request).await
}
