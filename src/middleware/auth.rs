use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::EntityTrait;
use uuid::Uuid;

use crate::{
    dto::auth::Claims,
    entity::users::Entity as Users,
    error::{AppError, AppResult},
    models::ROLE_ADMIN,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "token";
pub const SESSION_TTL_DAYS: i64 = 30;
/// Tokens with less than this left are re-issued by the session middleware.
pub const REFRESH_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, ROLE_ADMIN)
}

pub fn issue_token(secret: &str, user_id: Uuid, role: &str) -> AppResult<String> {
    issue_token_at(secret, user_id, role, Utc::now())
}

pub fn issue_token_at(
    secret: &str,
    user_id: Uuid,
    role: &str,
    now: DateTime<Utc>,
) -> AppResult<String> {
    let expiration = now
        .checked_add_signed(Duration::days(SESSION_TTL_DAYS))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn decode_token(secret: &str, token: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))
}

pub fn needs_refresh(claims: &Claims, now: DateTime<Utc>) -> bool {
    let remaining = claims.exp as i64 - now.timestamp();
    remaining < Duration::days(REFRESH_WINDOW_DAYS).num_seconds()
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    let max_age = Duration::days(SESSION_TTL_DAYS).num_seconds();
    let mut cookie =
        format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie(secure: bool) -> String {
    let mut cookie = format!("{SESSION_COOKIE}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Role currently stored for the account; `None` once it is deleted.
pub async fn stored_role(state: &AppState, user_id: Uuid) -> AppResult<Option<String>> {
    Ok(Users::find_by_id(user_id)
        .one(&state.orm)
        .await?
        .map(|user| user.role))
}

/// Bearer header wins over the session cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Missing session token".into()))?;

        let claims = decode_token(&state.config.jwt_secret, &token)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

        // Admin rights follow the account, not the token: a demoted or
        // deleted admin loses them on the next request.
        let role = if claims.role == ROLE_ADMIN {
            stored_role(state, user_id)
                .await?
                .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))?
        } else {
            claims.role
        };

        Ok(AuthUser { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn issued_token_round_trips_claims() {
        let user_id = Uuid::new_v4();
        let token = issue_token(SECRET, user_id, "admin").unwrap();
        let claims = decode_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn token_with_other_secret_is_unauthorized() {
        let token = issue_token(SECRET, Uuid::new_v4(), "user").unwrap();
        let err = decode_token("another-secret", &token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn refresh_only_inside_last_week() {
        let now = Utc::now();
        let fresh = Claims {
            sub: "x".into(),
            role: "user".into(),
            exp: (now + Duration::days(29)).timestamp() as usize,
        };
        let aging = Claims {
            exp: (now + Duration::days(6)).timestamp() as usize,
            ..fresh.clone()
        };
        assert!(!needs_refresh(&fresh, now));
        assert!(needs_refresh(&aging, now));
    }

    #[test]
    fn reads_token_from_cookie_or_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; token=abc.def.ghi; other=1"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc.def.ghi"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn empty_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("token="));
        assert!(token_from_headers(&headers).is_none());
    }

    #[test]
    fn cookie_attributes() {
        let cookie = session_cookie("abc", true);
        assert!(cookie.starts_with("token=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=2592000"));
        assert!(cookie.ends_with("; Secure"));
        assert!(clear_session_cookie(false).contains("Max-Age=0"));
    }

    #[test]
    fn admin_check() {
        let user = AuthUser {
            user_id: Uuid::new_v4(),
            role: "user".into(),
        };
        assert!(matches!(ensure_admin(&user), Err(AppError::Forbidden)));
        let admin = AuthUser {
            role: "admin".into(),
            ..user
        };
        assert!(ensure_admin(&admin).is_ok());
    }
}
