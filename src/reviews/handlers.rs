use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        authorize::{require_role, Role},
        extractors::CurrentUser,
    },
    error::ApiError,
    reviews::{
        dto::{CreateReviewRequest, UpdateReviewRequest},
        repo::Review,
        stats::recalculate_ratings,
    },
    state::AppState,
    tours::repo::Tour,
    users::repo::User,
};

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/tours/:tour_id/reviews",
            get(list_tour_reviews).post(create_review),
        )
        .route("/reviews", get(list_reviews))
        .route(
            "/reviews/:id",
            get(get_review).patch(update_review).delete(delete_review),
        )
}

fn validate_rating(rating: i32) -> Result<(), ApiError> {
    if !(1..=5).contains(&rating) {
        return Err(ApiError::Validation(
            "Rating must be between 1 and 5!".into(),
        ));
    }
    Ok(())
}

/// Admins may touch any review; regular users only their own. Guides write
/// no reviews at all.
fn authorize_review_mutation(user: &User, review: &Review) -> Result<(), ApiError> {
    if user.role == Role::Admin {
        return Ok(());
    }
    require_role(user, &[Role::User])?;
    if review.user_id != user.id {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

#[instrument(skip(state, _user))]
async fn list_tour_reviews(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(tour_id): Path<Uuid>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let reviews = Review::list_by_tour(&state.db, tour_id).await?;
    Ok(Json(reviews))
}

#[instrument(skip(state, _user))]
async fn list_reviews(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Vec<Review>>, ApiError> {
    let reviews = Review::list_all(&state.db).await?;
    Ok(Json(reviews))
}

#[instrument(skip(state, _user))]
async fn get_review(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Review>, ApiError> {
    let review = Review::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No review found with that ID!".into()))?;
    Ok(Json(review))
}

#[instrument(skip_all)]
async fn create_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(tour_id): Path<Uuid>,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    require_role(&user, &[Role::User])?;
    validate_rating(payload.rating)?;
    if payload.text.trim().is_empty() {
        return Err(ApiError::Validation("Review can not be empty!".into()));
    }

    Tour::find_by_id(&state.db, tour_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No tour found with that ID!".into()))?;

    let review =
        Review::create(&state.db, tour_id, user.id, payload.rating, payload.text.trim()).await?;

    // The mutation is only complete once the parent aggregate reflects it.
    recalculate_ratings(&state.db, tour_id).await?;

    info!(review_id = %review.id, tour_id = %tour_id, user_id = %user.id, "review created");
    Ok((StatusCode::CREATED, Json(review)))
}

#[instrument(skip_all)]
async fn update_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReviewRequest>,
) -> Result<Json<Review>, ApiError> {
    let review = Review::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No review found with that ID!".into()))?;
    authorize_review_mutation(&user, &review)?;

    if let Some(rating) = payload.rating {
        validate_rating(rating)?;
    }
    if let Some(text) = payload.text.as_deref() {
        if text.trim().is_empty() {
            return Err(ApiError::Validation("Review can not be empty!".into()));
        }
    }

    let updated = Review::update(
        &state.db,
        id,
        payload.rating,
        payload.text.as_deref().map(str::trim),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("No review found with that ID!".into()))?;

    recalculate_ratings(&state.db, updated.tour_id).await?;

    info!(review_id = %updated.id, tour_id = %updated.tour_id, "review updated");
    Ok(Json(updated))
}

#[instrument(skip(state, user))]
async fn delete_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let review = Review::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No review found with that ID!".into()))?;
    authorize_review_mutation(&user, &review)?;

    let removed = Review::delete(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No review found with that ID!".into()))?;

    recalculate_ratings(&state.db, removed.tour_id).await?;

    info!(review_id = %id, tour_id = %removed.tour_id, "review deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn review_by(user_id: Uuid) -> Review {
        Review {
            id: Uuid::new_v4(),
            tour_id: Uuid::new_v4(),
            user_id,
            rating: 4,
            text: "Great trip.".into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn rating_bounds() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn owner_may_mutate_own_review() {
        let user = User::fixture(Role::User);
        let review = review_by(user.id);
        assert!(authorize_review_mutation(&user, &review).is_ok());
    }

    #[test]
    fn stranger_may_not_mutate_others_review() {
        let user = User::fixture(Role::User);
        let review = review_by(Uuid::new_v4());
        let err = authorize_review_mutation(&user, &review).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }

    #[test]
    fn admin_may_mutate_any_review() {
        let admin = User::fixture(Role::Admin);
        let review = review_by(Uuid::new_v4());
        assert!(authorize_review_mutation(&admin, &review).is_ok());
    }

    #[test]
    fn guides_may_not_write_reviews() {
        let guide = User::fixture(Role::Guide);
        let review = review_by(guide.id);
        let err = authorize_review_mutation(&guide, &review).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }
}
