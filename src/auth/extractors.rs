use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::auth::jwt::JwtKeys;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo::User;

/// Cookie carrying the session credential when no Authorization header is
/// sent (browser clients).
pub const AUTH_COOKIE: &str = "jwt";

/// Session guard: resolves the request's credential to a live, still-valid
/// user. Rejections keep the failure kinds apart (missing, invalid, expired,
/// gone, stale).
pub struct CurrentUser(pub User);

/// Non-failing variant for endpoints that personalize when a visitor is
/// logged in but must not error for anonymous ones.
pub struct MaybeUser(pub Option<User>);

/// Bearer token from the Authorization header, falling back to the session
/// cookie. A header with a different scheme is ignored, not rejected.
fn token_from_parts(parts: &Parts) -> Option<String> {
    if let Some(header) = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
        {
            return Some(token.trim().to_string());
        }
    }

    let jar = CookieJar::from_headers(&parts.headers);
    jar.get(AUTH_COOKIE).map(|c| c.value().to_string())
}

async fn authenticate(parts: &Parts, state: &AppState) -> Result<User, ApiError> {
    // 1) Find a credential at all.
    let token = token_from_parts(parts).ok_or(ApiError::Unauthenticated)?;

    // 2) Signature and expiry.
    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify(&token)?;

    // 3) The subject must still exist and be active.
    let user = User::find_active_by_id(&state.db, claims.sub)
        .await?
        .ok_or(ApiError::UserGone)?;

    // 4) Tokens minted before the last password rotation are dead.
    if user.changed_password_after(claims.iat as i64) {
        return Err(ApiError::StaleCredential);
    }

    Ok(user)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).await.map(CurrentUser)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match authenticate(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(e) => {
                debug!(reason = %e, "anonymous request");
                Ok(MaybeUser(None))
            }
        }
    }
}
