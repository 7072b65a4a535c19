use axum::{
    extract::{Query, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::Instrument;

use crate::api::state::AppState;
use crate::auth::{AuthUser, Role};
use crate::context::{CorrelationId, CORRELATION_HEADER};
use crate::error::AppError;

/// Correlation middleware - reuses or mints the request id, records it on the
/// request span and echoes it back
pub async fn correlation_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(CorrelationId::from_header)
        .unwrap_or_else(CorrelationId::generate);

    request.extensions_mut().insert(correlation_id.clone());

    let span = tracing::info_span!(
        "request",
        correlation_id = %correlation_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

fn bearer_token(request: &Request) -> Result<Option<&str>, AppError> {
    let Some(header) = request.headers().get("Authorization") else {
        return Ok(None);
    };

    let header = header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid Authorization header".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim()))
        .ok_or_else(|| AppError::Auth("Invalid Authorization format".to_string()))
}

/// Authentication middleware - validates the bearer JWT
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?
        .ok_or_else(|| AppError::Auth("Missing Authorization header".to_string()))?;

    let user = state.tokens.verify(token)?;
    tracing::debug!(user_id = %user.user_id, role = %user.role, "request authenticated");

    // Store the typed identity in request extensions
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Like [`auth_middleware`] but never rejects. Browsers cannot set headers on
/// WebSocket upgrades, so `?token=` is accepted as well; the handler decides
/// what to do without an identity.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let from_header = bearer_token(&request).ok().flatten().map(str::to_string);
    let token = from_header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(q)| q.token)
    });

    if let Some(token) = token {
        match state.tokens.verify(&token) {
            Ok(user) => {
                request.extensions_mut().insert(user);
            }
            Err(e) => tracing::debug!("ignoring invalid token: {}", e),
        }
    }

    next.run(request).await
}

/// Role gate - must sit inside [`auth_middleware`]
pub async fn require_role(
    required: Role,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| AppError::Auth("Not authenticated".to_string()))?;

    if !user.role.satisfies(required) {
        tracing::debug!(user_id = %user.user_id, role = %user.role, %required, "role check failed");
        return Err(AppError::Forbidden(format!("{} role required", required)));
    }

    Ok(next.run(request).await)
}
