use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// Value the aggregate falls back to when a tour has no reviews at all.
pub const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingStats {
    pub average: f64,
    pub quantity: i64,
}

fn fold_stats(quantity: i64, average: Option<f64>) -> RatingStats {
    match average {
        Some(average) if quantity > 0 => RatingStats { average, quantity },
        _ => RatingStats {
            average: DEFAULT_RATINGS_AVERAGE,
            quantity: 0,
        },
    }
}

/// Rescan the tour's full review set and write the aggregate back as an
/// absolute value. Idempotent; running it twice with no intervening writes
/// is a no-op. Called synchronously as the final step of every review
/// mutation, so any read after the mutation is acknowledged sees the
/// updated pair.
pub async fn recalculate_ratings(db: &PgPool, tour_id: Uuid) -> Result<RatingStats, sqlx::Error> {
    let (count, average): (i64, Option<f64>) =
        sqlx::query_as("SELECT COUNT(*), AVG(rating)::float8 FROM reviews WHERE tour_id = $1")
            .bind(tour_id)
            .fetch_one(db)
            .await?;

    let stats = fold_stats(count, average);

    sqlx::query("UPDATE tours SET ratings_average = $2, ratings_quantity = $3 WHERE id = $1")
        .bind(tour_id)
        .bind(stats.average)
        .bind(stats.quantity as i32)
        .execute(db)
        .await?;

    debug!(
        %tour_id,
        average = stats.average,
        quantity = stats.quantity,
        "tour ratings recalculated"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_review_set_takes_the_documented_default() {
        let stats = fold_stats(0, None);
        assert_eq!(stats.average, DEFAULT_RATINGS_AVERAGE);
        assert_eq!(stats.quantity, 0);
    }

    #[test]
    fn mean_and_count_pass_through() {
        // Ratings [5, 3, 4] aggregate to (4.0, 3).
        let stats = fold_stats(3, Some(4.0));
        assert_eq!(stats.average, 4.0);
        assert_eq!(stats.quantity, 3);
    }

    #[test]
    fn remaining_reviews_after_a_delete() {
        // [5, 4] left after deleting the rating-3 review: (4.5, 2).
        let stats = fold_stats(2, Some(4.5));
        assert_eq!(stats.average, 4.5);
        assert_eq!(stats.quantity, 2);
    }

    #[test]
    fn zero_count_wins_over_a_stray_average() {
        let stats = fold_stats(0, Some(4.9));
        assert_eq!(stats.quantity, 0);
        assert_eq!(stats.average, DEFAULT_RATINGS_AVERAGE);
    }
}
