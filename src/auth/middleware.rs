use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, WWW_AUTHENTICATE},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::{SessionContext, SessionError, resolve_session};
use crate::server::AppState;

pub const SESSION_COOKIE: &str = "hydro_session";

/// Extractor that requires a live session.
pub struct RequireSession(pub SessionContext);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    SessionExpired,
    StorageUnavailable,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid session"),
            AuthError::SessionExpired => (StatusCode::UNAUTHORIZED, "Session expired"),
            AuthError::StorageUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable")
            }
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"hydrotrack\""),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw_token = extract_session_token(&parts.headers)?.ok_or(AuthError::MissingAuth)?;

        let now = state.clock.utc();
        let context = state
            .run_blocking(move |state| {
                resolve_session(state.store.as_ref(), &state.hasher, &raw_token, now)
            })
            .await
            .map_err(|_| AuthError::StorageUnavailable)?
            .map_err(|e| match e {
                SessionError::InvalidToken => AuthError::InvalidToken,
                SessionError::Expired => AuthError::SessionExpired,
                SessionError::InternalError => AuthError::InternalError,
            })?;

        Ok(RequireSession(context))
    }
}

/// Reads the session token from a Bearer header, falling back to the
/// session cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Result<Option<String>, AuthError> {
    if let Some(header) = headers.get(AUTHORIZATION) {
        let value = header.to_str().map_err(|_| AuthError::InvalidScheme)?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidScheme)?
            .trim();
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        return Ok(Some(token.to_string()));
    }

    let token = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty());

    Ok(token)
}
