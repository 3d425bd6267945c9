use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::tours::dto::{CreateTourRequest, UpdateTourRequest};

const TOUR_COLUMNS: &str = "id, name, duration, max_group_size, difficulty, price, summary, \
     description, ratings_average, ratings_quantity, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub price: f64,
    pub summary: String,
    pub description: Option<String>,
    /// Derived pair, owned by the rating recalculation; handlers never
    /// write these directly.
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub created_at: OffsetDateTime,
}

impl Tour {
    pub async fn list(db: &PgPool, limit: i64, offset: i64) -> Result<Vec<Tour>, sqlx::Error> {
        sqlx::query_as::<_, Tour>(&format!(
            "SELECT {TOUR_COLUMNS} FROM tours ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<Tour>, sqlx::Error> {
        sqlx::query_as::<_, Tour>(&format!("SELECT {TOUR_COLUMNS} FROM tours WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn create(db: &PgPool, req: &CreateTourRequest) -> Result<Tour, sqlx::Error> {
        sqlx::query_as::<_, Tour>(&format!(
            "INSERT INTO tours (name, duration, max_group_size, difficulty, price, summary, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {TOUR_COLUMNS}"
        ))
        .bind(&req.name)
        .bind(req.duration)
        .bind(req.max_group_size)
        .bind(&req.difficulty)
        .bind(req.price)
        .bind(&req.summary)
        .bind(&req.description)
        .fetch_one(db)
        .await
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        req: &UpdateTourRequest,
    ) -> Result<Option<Tour>, sqlx::Error> {
        sqlx::query_as::<_, Tour>(&format!(
            "UPDATE tours SET \
                 name = COALESCE($2, name), \
                 duration = COALESCE($3, duration), \
                 max_group_size = COALESCE($4, max_group_size), \
                 difficulty = COALESCE($5, difficulty), \
                 price = COALESCE($6, price), \
                 summary = COALESCE($7, summary), \
                 description = COALESCE($8, description) \
             WHERE id = $1 RETURNING {TOUR_COLUMNS}"
        ))
        .bind(id)
        .bind(&req.name)
        .bind(req.duration)
        .bind(req.max_group_size)
        .bind(&req.difficulty)
        .bind(req.price)
        .bind(&req.summary)
        .bind(&req.description)
        .fetch_optional(db)
        .await
    }

    /// Returns the number of rows removed so callers can map zero to a
    /// not-found response.
    pub async fn delete(db: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tours WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }
}
