//! Read-only views over the pipeline's tables.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use sqlx::SqlitePool;
use utoipa::IntoParams;

use crate::db::models::{CityFreshness, CleaningRunLog, DailySummary};
use crate::db::queries;
use crate::errors::{AppError, ErrorResponse};

#[derive(Debug, Deserialize, IntoParams)]
pub struct SummaryQuery {
    /// Restrict to one city (exact match)
    pub city: Option<String>,
}

/// List daily summaries, ordered by city then date.
#[utoipa::path(
    get,
    path = "/api/v1/summaries",
    tag = "Summaries",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Daily per-city statistics", body = Vec<DailySummary>),
        (status = 500, description = "Store error", body = ErrorResponse),
    )
)]
pub async fn list_summaries(
    State(pool): State<SqlitePool>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<Vec<DailySummary>>, AppError> {
    let city = params.city.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let rows = queries::list_daily_summaries(&pool, city).await?;
    Ok(Json(rows))
}

/// Last successful fetch time per city.
#[utoipa::path(
    get,
    path = "/api/v1/cities/freshness",
    tag = "Summaries",
    responses(
        (status = 200, description = "Most recent fetch per city", body = Vec<CityFreshness>),
        (status = 500, description = "Store error", body = ErrorResponse),
    )
)]
pub async fn list_freshness(
    State(pool): State<SqlitePool>,
) -> Result<Json<Vec<CityFreshness>>, AppError> {
    Ok(Json(queries::list_city_freshness(&pool).await?))
}

/// Cleaning run audit log, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/cleaning/runs",
    tag = "Summaries",
    responses(
        (status = 200, description = "Cleaning run history", body = Vec<CleaningRunLog>),
        (status = 500, description = "Store error", body = ErrorResponse),
    )
)]
pub async fn list_cleaning_runs(
    State(pool): State<SqlitePool>,
) -> Result<Json<Vec<CleaningRunLog>>, AppError> {
    Ok(Json(queries::list_cleaning_runs(&pool).await?))
}
