use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        authorize::{require_role, Role},
        extractors::{CurrentUser, MaybeUser},
    },
    error::ApiError,
    state::AppState,
    tours::{
        dto::{CreateTourRequest, TourListQuery, UpdateTourRequest},
        repo::Tour,
    },
};

const TOUR_MANAGERS: &[Role] = &[Role::Admin, Role::LeadGuide];

pub fn tour_routes() -> Router<AppState> {
    Router::new()
        .route("/tours", get(list_tours).post(create_tour))
        .route(
            "/tours/:tour_id",
            get(get_tour).patch(update_tour).delete(delete_tour),
        )
}

#[instrument(skip(state, _user))]
async fn list_tours(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(q): Query<TourListQuery>,
) -> Result<Json<Vec<Tour>>, ApiError> {
    let tours = Tour::list(&state.db, q.limit, q.offset).await?;
    Ok(Json(tours))
}

#[instrument(skip(state, viewer))]
async fn get_tour(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Tour>, ApiError> {
    if let Some(viewer) = &viewer {
        debug!(user_id = %viewer.id, tour_id = %id, "tour viewed by known user");
    }
    let tour = Tour::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No tour found with that ID!".into()))?;
    Ok(Json(tour))
}

#[instrument(skip_all)]
async fn create_tour(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateTourRequest>,
) -> Result<(StatusCode, Json<Tour>), ApiError> {
    require_role(&user, TOUR_MANAGERS)?;

    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("A tour must have a name!".into()));
    }
    if payload.price <= 0.0 {
        return Err(ApiError::Validation("Price must be above zero!".into()));
    }

    let tour = Tour::create(&state.db, &payload).await?;
    info!(tour_id = %tour.id, name = %tour.name, "tour created");
    Ok((StatusCode::CREATED, Json(tour)))
}

#[instrument(skip(state, user, payload))]
async fn update_tour(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTourRequest>,
) -> Result<Json<Tour>, ApiError> {
    require_role(&user, TOUR_MANAGERS)?;

    if let Some(price) = payload.price {
        if price <= 0.0 {
            return Err(ApiError::Validation("Price must be above zero!".into()));
        }
    }

    let tour = Tour::update(&state.db, id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound("No tour found with that ID!".into()))?;
    info!(tour_id = %tour.id, "tour updated");
    Ok(Json(tour))
}

#[instrument(skip(state, user))]
async fn delete_tour(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_role(&user, TOUR_MANAGERS)?;

    let removed = Tour::delete(&state.db, id).await?;
    if removed == 0 {
        return Err(ApiError::NotFound("No tour found with that ID!".into()));
    }
    info!(tour_id = %id, "tour deleted");
    Ok(StatusCode::NO_CONTENT)
}
