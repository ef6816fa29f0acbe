use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// One successful per-city fetch (table `weather`). Append-only.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, ToSchema)]
pub struct WeatherObservation {
    pub city: String,
    /// Fetch timestamp, `%Y-%m-%d %H:%M:%S` local time
    #[sqlx(rename = "date")]
    pub fetched_at: String,
    #[sqlx(rename = "state")]
    pub condition: String,
    #[sqlx(rename = "temp")]
    pub temperature: f64,
}

/// Most recent successful fetch per city (table `last_updated`).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, ToSchema)]
pub struct CityFreshness {
    pub city: String,
    pub last_fetch: String,
}

/// A record accepted by the cleaning pipeline (table `cleaned_weather`).
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct CleanedRecord {
    pub city: String,
    pub temperature: f64,
    pub condition: String,
}

/// Audit row written once per cleaning run (table `cleaning_log`).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, ToSchema)]
pub struct CleaningRunLog {
    pub run_id: i64,
    pub timestamp: String,
    pub total_records: i64,
    pub cleaned: i64,
    pub skipped: i64,
}

/// Per-city, per-day statistics (table `daily_summary`).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, ToSchema)]
pub struct DailySummary {
    pub city: String,
    /// Calendar day, `YYYY-MM-DD`
    pub date: String,
    pub avg_temp: f64,
    pub min_temp: f64,
    pub max_temp: f64,
    /// "Hot", "Warm" or "Cool"
    pub category: String,
}
