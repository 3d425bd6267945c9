use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        authorize::{require_role, Role},
        extractors::CurrentUser,
        handlers::is_valid_email,
    },
    error::ApiError,
    state::AppState,
    users::{
        dto::{PublicUser, UpdateMeRequest, UserListQuery},
        repo::User,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/me", get(get_me).patch(update_me).delete(delete_me))
}

#[instrument(skip_all)]
async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(user))
}

#[instrument(skip_all)]
async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(mut payload): Json<UpdateMeRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    if payload.password.is_some() || payload.password_confirm.is_some() {
        return Err(ApiError::Validation(
            "This route is not for password updates! Please use /updateMyPassword.".into(),
        ));
    }

    if let Some(email) = payload.email.as_mut() {
        *email = email.trim().to_lowercase();
        if !is_valid_email(email) {
            return Err(ApiError::Validation("Please provide a valid email!".into()));
        }
    }
    if let Some(name) = payload.name.as_deref() {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("Name can not be empty!".into()));
        }
    }

    let updated = User::update_profile(
        &state.db,
        user.id,
        payload.name.as_deref().map(str::trim),
        payload.email.as_deref(),
    )
    .await?;

    info!(user_id = %updated.id, "profile updated");
    Ok(Json(PublicUser::from(updated)))
}

#[instrument(skip_all)]
async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode, ApiError> {
    User::deactivate(&state.db, user.id).await?;
    info!(user_id = %user.id, "account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user))]
async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<UserListQuery>,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    require_role(&user, &[Role::Admin])?;
    let users = User::list(&state.db, q.limit, q.offset).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}
