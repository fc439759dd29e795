use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::application::admin::Caller;

use super::error::ApiError;
use super::state::ApiState;

/// Resolve the bearer token into a [`Caller`].
///
/// A missing token is rejected here; a wrong one yields an unprivileged
/// caller so the service's capability check decides.
pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = extract_token(request.headers().get(AUTHORIZATION)).or_else(|| {
        request
            .headers()
            .get("x-admin-token")
            .and_then(|v| v.to_str().ok().map(|s| s.to_string()))
    });

    let Some(token) = token else {
        return ApiError::unauthorized().into_response();
    };

    let privileged = match state.admin_token.as_deref() {
        Some(expected) => bool::from(token.as_bytes().ct_eq(expected.as_bytes())),
        None => {
            warn!(
                target = "cachepoint::api::auth",
                "admin token not configured; rejecting call"
            );
            false
        }
    };

    let caller = Caller { privileged };
    request.extensions_mut().insert(caller);
    let mut response = next.run(request).await;
    response.extensions_mut().insert(caller);
    response
}

fn extract_token(header: Option<&HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?;
    Some(bearer.trim().to_string())
}
