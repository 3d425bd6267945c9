use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse,
            ResetPasswordRequest, SignupRequest, UpdatePasswordRequest,
        },
        extractors::{CurrentUser, AUTH_COOKIE},
        jwt::JwtKeys,
        password::{
            generate_reset_token, hash_password, hash_reset_token, verify_password,
            RESET_TOKEN_TTL_MINUTES,
        },
    },
    error::ApiError,
    mail::{EmailKind, OutgoingEmail},
    state::AppState,
    users::{dto::PublicUser, repo::User},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/forgotPassword", post(forgot_password))
        .route("/users/resetPassword/:token", patch(reset_password))
        .route("/users/updateMyPassword", patch(update_my_password))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn validate_new_password(password: &str, confirm: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters long!".into(),
        ));
    }
    if password != confirm {
        return Err(ApiError::Validation("Passwords are not the same!".into()));
    }
    Ok(())
}

fn session_cookie(token: &str, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE.to_string(), token.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(TimeDuration::seconds(max_age_secs))
        .build()
}

/// Logout is a client-side directive: overwrite the cookie with a value that
/// expires immediately.
fn logged_out_cookie() -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE.to_string(), "loggedout".to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(TimeDuration::seconds(1))
        .build()
}

/// Mint a credential for the user and attach it both as the response body
/// and as an httpOnly cookie.
fn issue_session(
    state: &AppState,
    user: User,
    status: StatusCode,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id)?;
    let jar = CookieJar::new().add(session_cookie(&token, keys.ttl.as_secs() as i64));
    Ok((
        status,
        jar,
        Json(AuthResponse {
            token,
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, payload))]
async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("Please tell us your name!".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid signup email");
        return Err(ApiError::Validation("Please provide a valid email!".into()));
    }
    validate_new_password(&payload.password, &payload.password_confirm)?;

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, payload.name.trim(), &payload.email, &hash).await?;

    // The account exists either way; a lost welcome mail is not worth
    // failing the signup over.
    let url = format!("{}/me", state.config.public_base_url);
    if let Err(e) = state
        .mailer
        .send(OutgoingEmail {
            kind: EmailKind::Welcome,
            to: user.email.clone(),
            recipient_name: user.name.clone(),
            url,
        })
        .await
    {
        warn!(error = %e, user_id = %user.id, "welcome email failed");
    }

    info!(user_id = %user.id, email = %user.email, "user signed up");
    issue_session(&state, user, StatusCode::CREATED)
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation(
            "Please provide email and password!".into(),
        ));
    }

    // Unknown email and wrong password must be indistinguishable.
    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or(ApiError::IncorrectCredentials)?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(ApiError::IncorrectCredentials);
    }

    info!(user_id = %user.id, "user logged in");
    issue_session(&state, user, StatusCode::OK)
}

#[instrument]
async fn logout() -> (CookieJar, Json<MessageResponse>) {
    let jar = CookieJar::new().add(logged_out_cookie());
    (
        jar,
        Json(MessageResponse {
            message: "Logged out.".into(),
        }),
    )
}

#[instrument(skip(state, payload))]
async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("There is no user with that email address!".into()))?;

    let reset_token = generate_reset_token();
    let token_hash = hash_reset_token(&reset_token);
    let expires_at = OffsetDateTime::now_utc() + TimeDuration::minutes(RESET_TOKEN_TTL_MINUTES);
    User::set_reset_token(&state.db, user.id, &token_hash, expires_at).await?;

    let reset_url = format!(
        "{}/api/v1/users/resetPassword/{}",
        state.config.public_base_url, reset_token
    );
    if let Err(e) = state
        .mailer
        .send(OutgoingEmail {
            kind: EmailKind::PasswordReset,
            to: user.email.clone(),
            recipient_name: user.name.clone(),
            url: reset_url,
        })
        .await
    {
        // The user was never told the secret; a pending reset must not
        // survive a failed dispatch.
        error!(error = %e, user_id = %user.id, "password reset email failed");
        User::clear_reset_token(&state.db, user.id).await?;
        return Err(ApiError::DispatchFailed);
    }

    info!(user_id = %user.id, "password reset token issued");
    Ok(Json(MessageResponse {
        message: "Token sent to email!".into(),
    }))
}

#[instrument(skip(state, payload, token))]
async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    validate_new_password(&payload.password, &payload.password_confirm)?;

    let token_hash = hash_reset_token(&token);
    let user = User::find_by_reset_token(&state.db, &token_hash)
        .await?
        .ok_or(ApiError::InvalidOrExpired)?;

    let hash = hash_password(&payload.password)?;
    let user = User::reset_password(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "password reset completed");
    issue_session(&state, user, StatusCode::OK)
}

#[instrument(skip_all)]
async fn update_my_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    if !verify_password(&payload.password_current, &user.password_hash)? {
        warn!(user_id = %user.id, "password change with wrong current password");
        return Err(ApiError::WrongPassword);
    }
    validate_new_password(&payload.password, &payload.password_confirm)?;

    let hash = hash_password(&payload.password)?;
    let user = User::change_password(&state.db, user.id, &hash).await?;

    // The credential that authenticated this call is stale now; hand the
    // client a fresh one.
    info!(user_id = %user.id, "password changed");
    issue_session(&state, user, StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_accepts_plain_addresses() {
        assert!(is_valid_email("jo@example.com"));
        assert!(is_valid_email("jo.anne+tours@sub.example.co"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@at@signs.com"));
        assert!(!is_valid_email("spaces in@example.com"));
    }

    #[test]
    fn new_password_rules() {
        assert!(validate_new_password("longenough", "longenough").is_ok());
        let short = validate_new_password("short", "short").unwrap_err();
        assert!(matches!(short, ApiError::Validation(_)));
        let mismatch = validate_new_password("longenough", "different!").unwrap_err();
        assert!(matches!(mismatch, ApiError::Validation(_)));
    }

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie("tok", 60);
        assert_eq!(cookie.name(), AUTH_COOKIE);
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(TimeDuration::seconds(60)));
    }

    #[test]
    fn logout_cookie_expires_immediately() {
        let cookie = logged_out_cookie();
        assert_eq!(cookie.name(), AUTH_COOKIE);
        assert_eq!(cookie.value(), "loggedout");
        assert_eq!(cookie.max_age(), Some(TimeDuration::seconds(1)));
    }

    #[tokio::test]
    async fn issue_session_returns_verifiable_token() {
        let state = AppState::fake();
        let user = User::fixture(crate::auth::authorize::Role::User);
        let user_id = user.id;
        let (status, _jar, Json(body)) =
            issue_session(&state, user, StatusCode::OK).expect("issue");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.user.id, user_id);

        let keys = JwtKeys::from_ref(&state);
        let claims = keys.verify(&body.token).expect("verify");
        assert_eq!(claims.sub, user_id);
    }
}
