use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
    routing::post,
};

use crate::auth::{self, RequireSession, SESSION_COOKIE, validate_password};
use crate::server::AppState;
use crate::server::dto::{LoginRequest, LoginResponse};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};

pub fn session_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
}

fn session_cookie(token: &str, max_age_secs: i64) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    ))
    .map_err(|_| ApiError::internal("Failed to build session cookie"))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    validate_password(&req.password).map_err(ApiError::bad_request)?;

    let now = state.clock.utc();
    let ttl = state.session_ttl;
    let issued = state
        .run_blocking(move |state| {
            auth::login(state.store.as_ref(), &state.hasher, &req.password, ttl, now)
        })
        .await?
        .api_err("Failed to log in")?
        .ok_or_else(|| ApiError::unauthorized("Invalid password"))?;

    let cookie = session_cookie(&issued.token, ttl.num_seconds())?;
    let body = LoginResponse {
        token: issued.token,
        expires_at: issued.session.expires_at,
    };

    Ok::<_, ApiError>(([(SET_COOKIE, cookie)], Json(ApiResponse::success(body))))
}

pub async fn logout(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    state
        .run_blocking(move |state| auth::logout(state.store.as_ref(), &session))
        .await?
        .api_err("Failed to log out")?;

    let cookie = session_cookie("", 0)?;
    Ok::<_, ApiError>((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]))
}
