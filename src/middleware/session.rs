//! Sliding session refresh.
//!
//! A request carrying a valid token that expires within
//! [`REFRESH_WINDOW_DAYS`](super::auth::REFRESH_WINDOW_DAYS) gets a fresh
//! 30-day cookie on its successful response. The new token carries the role
//! stored for the account, and nothing is issued once the account is gone.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header::SET_COOKIE},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    middleware::auth::{
        decode_token, issue_token, needs_refresh, session_cookie, stored_role, token_from_headers,
    },
    state::AppState,
};

pub async fn refresh_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let expiring = token_from_headers(request.headers())
        .and_then(|token| decode_token(&state.config.jwt_secret, &token).ok())
        .filter(|claims| needs_refresh(claims, Utc::now()));

    let mut response = next.run(request).await;

    let Some(claims) = expiring else {
        return response;
    };
    // Login and logout already set their own cookie.
    if !response.status().is_success() || response.headers().contains_key(SET_COOKIE) {
        return response;
    }

    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return response;
    };
    let role = match stored_role(&state, user_id).await {
        Ok(Some(role)) => role,
        Ok(None) => {
            tracing::debug!(user_id = %user_id, "session owner no longer exists, not refreshed");
            return response;
        }
        Err(err) => {
            tracing::warn!(error = %err, user_id = %user_id, "session refresh skipped");
            return response;
        }
    };
    match issue_token(&state.config.jwt_secret, user_id, &role) {
        Ok(token) => {
            let cookie = session_cookie(&token, state.config.cookie_secure);
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(SET_COOKIE, value);
                tracing::debug!(user_id = %user_id, "session refreshed");
            }
        }
        Err(err) => tracing::warn!(error = %err, "session refresh failed"),
    }

    response
}
