//! Daily summary aggregation.
//!
//! Recomputes every `(city, day)` group from the full `weather` table and
//! upserts it into `daily_summary`. This is a full recomputation, not an
//! incremental one, so a re-run over unchanged data writes identical rows.

use sqlx::SqlitePool;

use crate::config::TemperatureThresholds;
use crate::db::models::DailySummary;
use crate::db::queries::{self, DailyAggregate};
use crate::db::schema;
use crate::errors::AppError;

/// Classify an average temperature.
pub fn categorize(avg_temp: f64, thresholds: &TemperatureThresholds) -> &'static str {
    if avg_temp >= thresholds.hot {
        "Hot"
    } else if avg_temp >= thresholds.warm {
        "Warm"
    } else {
        "Cool"
    }
}

fn to_summary(group: DailyAggregate, thresholds: &TemperatureThresholds) -> DailySummary {
    DailySummary {
        category: categorize(group.avg_temp, thresholds).to_string(),
        city: group.city,
        date: group.date,
        avg_temp: group.avg_temp,
        min_temp: group.min_temp,
        max_temp: group.max_temp,
    }
}

/// Recompute and upsert all daily summaries. Returns the number of groups written.
pub async fn update_daily_summary(
    pool: &SqlitePool,
    thresholds: &TemperatureThresholds,
) -> Result<usize, AppError> {
    schema::ensure_ingest_tables(pool).await?;
    schema::ensure_daily_summary_table(pool).await?;

    let groups = queries::aggregate_daily_weather(pool).await?;
    let count = groups.len();

    let mut tx = pool.begin().await?;
    for group in groups {
        let summary = to_summary(group, thresholds);
        queries::upsert_daily_summary(&mut tx, &summary).await?;
    }
    tx.commit().await?;

    tracing::info!("Daily summary updated: {} city-day groups", count);
    Ok(count)
}
