use sqlx::{FromRow, SqliteConnection, SqlitePool};

use super::models::{
    CityFreshness, CleanedRecord, CleaningRunLog, DailySummary, WeatherObservation,
};
use crate::services::validator::ValidatedObservation;

/// Aggregated statistics for one `(city, day)` group of `weather` rows.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DailyAggregate {
    pub city: String,
    pub date: String,
    pub avg_temp: f64,
    pub min_temp: f64,
    pub max_temp: f64,
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// Append one observation to `weather`.
pub async fn insert_weather_observation(
    conn: &mut SqliteConnection,
    obs: &WeatherObservation,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO weather (city, date, state, temp) VALUES (?, ?, ?, ?)")
        .bind(&obs.city)
        .bind(&obs.fetched_at)
        .bind(&obs.condition)
        .bind(obs.temperature)
        .execute(conn)
        .await?;
    Ok(())
}

/// Insert or overwrite the freshness row for `city`.
pub async fn upsert_city_freshness(
    conn: &mut SqliteConnection,
    city: &str,
    last_fetch: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO last_updated (city, last_fetch) VALUES (?, ?)
         ON CONFLICT(city) DO UPDATE SET last_fetch = excluded.last_fetch",
    )
    .bind(city)
    .bind(last_fetch)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list_weather(pool: &SqlitePool) -> Result<Vec<WeatherObservation>, sqlx::Error> {
    sqlx::query_as::<_, WeatherObservation>(
        "SELECT city, date, state, temp FROM weather ORDER BY date, city",
    )
    .fetch_all(pool)
    .await
}

pub async fn list_city_freshness(pool: &SqlitePool) -> Result<Vec<CityFreshness>, sqlx::Error> {
    sqlx::query_as::<_, CityFreshness>("SELECT city, last_fetch FROM last_updated ORDER BY city")
        .fetch_all(pool)
        .await
}

// ---------------------------------------------------------------------------
// Cleaning
// ---------------------------------------------------------------------------

pub async fn insert_cleaned_record(
    conn: &mut SqliteConnection,
    obs: &ValidatedObservation,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO cleaned_weather (city, temperature, condition) VALUES (?, ?, ?)")
        .bind(&obs.city)
        .bind(obs.temperature)
        .bind(&obs.condition)
        .execute(conn)
        .await?;
    Ok(())
}

/// Cleaned rows, hottest first.
pub async fn list_cleaned_by_temperature(
    pool: &SqlitePool,
) -> Result<Vec<CleanedRecord>, sqlx::Error> {
    sqlx::query_as::<_, CleanedRecord>(
        "SELECT city, temperature, condition FROM cleaned_weather ORDER BY temperature DESC",
    )
    .fetch_all(pool)
    .await
}

/// Append a cleaning run audit row and return its `run_id`.
pub async fn insert_cleaning_log(
    pool: &SqlitePool,
    timestamp: &str,
    total: i64,
    cleaned: i64,
    skipped: i64,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO cleaning_log (timestamp, total_records, cleaned, skipped)
         VALUES (?, ?, ?, ?)",
    )
    .bind(timestamp)
    .bind(total)
    .bind(cleaned)
    .bind(skipped)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// All cleaning runs, newest first.
pub async fn list_cleaning_runs(pool: &SqlitePool) -> Result<Vec<CleaningRunLog>, sqlx::Error> {
    sqlx::query_as::<_, CleaningRunLog>(
        "SELECT run_id, timestamp, total_records, cleaned, skipped
         FROM cleaning_log
         ORDER BY run_id DESC",
    )
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// Daily summary
// ---------------------------------------------------------------------------

/// Group every `weather` row by city and calendar day.
pub async fn aggregate_daily_weather(
    pool: &SqlitePool,
) -> Result<Vec<DailyAggregate>, sqlx::Error> {
    sqlx::query_as::<_, DailyAggregate>(
        "SELECT city,
                DATE(date) AS date,
                AVG(temp) AS avg_temp,
                MIN(temp) AS min_temp,
                MAX(temp) AS max_temp
         FROM weather
         WHERE city IS NOT NULL AND temp IS NOT NULL AND DATE(date) IS NOT NULL
         GROUP BY city, DATE(date)
         ORDER BY city, DATE(date)",
    )
    .fetch_all(pool)
    .await
}

pub async fn upsert_daily_summary(
    conn: &mut SqliteConnection,
    summary: &DailySummary,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO daily_summary (city, date, avg_temp, min_temp, max_temp, category)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(city, date) DO UPDATE SET
             avg_temp = excluded.avg_temp,
             min_temp = excluded.min_temp,
             max_temp = excluded.max_temp,
             category = excluded.category",
    )
    .bind(&summary.city)
    .bind(&summary.date)
    .bind(summary.avg_temp)
    .bind(summary.min_temp)
    .bind(summary.max_temp)
    .bind(&summary.category)
    .execute(conn)
    .await?;
    Ok(())
}

/// Daily summaries ordered by city and date, optionally for one city.
pub async fn list_daily_summaries(
    pool: &SqlitePool,
    city: Option<&str>,
) -> Result<Vec<DailySummary>, sqlx::Error> {
    sqlx::query_as::<_, DailySummary>(
        "SELECT city, date, avg_temp, min_temp, max_temp, category
         FROM daily_summary
         WHERE ?1 IS NULL OR city = ?1
         ORDER BY city, date",
    )
    .bind(city)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;

    fn observation(city: &str, fetched_at: &str, temperature: f64) -> WeatherObservation {
        WeatherObservation {
            city: city.to_string(),
            fetched_at: fetched_at.to_string(),
            condition: "Sunny".to_string(),
            temperature,
        }
    }

    #[tokio::test]
    async fn test_freshness_upsert_keeps_one_row_with_latest_value() {
        let (pool, _dir) = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        upsert_city_freshness(&mut conn, "Tokyo", "2026-10-19 10:00:00")
            .await
            .unwrap();
        upsert_city_freshness(&mut conn, "Tokyo", "2026-10-19 10:01:00")
            .await
            .unwrap();
        drop(conn);

        let rows = list_city_freshness(&pool).await.unwrap();
        assert_eq!(
            rows,
            vec![CityFreshness {
                city: "Tokyo".to_string(),
                last_fetch: "2026-10-19 10:01:00".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_weather_insert_round_trips_column_mapping() {
        let (pool, _dir) = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let obs = observation("Chennai", "2026-10-19 09:00:00", 31.0);
        insert_weather_observation(&mut conn, &obs).await.unwrap();
        drop(conn);

        assert_eq!(list_weather(&pool).await.unwrap(), vec![obs]);
    }

    #[tokio::test]
    async fn test_aggregate_groups_by_city_and_day() {
        let (pool, _dir) = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        for obs in [
            observation("Tokyo", "2026-10-19 09:00:00", 24.0),
            observation("Tokyo", "2026-10-19 15:00:00", 28.0),
            observation("Tokyo", "2026-10-20 09:00:00", 21.0),
            observation("Chennai", "2026-10-19 12:00:00", 33.0),
        ] {
            insert_weather_observation(&mut conn, &obs).await.unwrap();
        }
        drop(conn);

        let groups = aggregate_daily_weather(&pool).await.unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].city, "Chennai");
        assert_eq!(groups[1].date, "2026-10-19");
        assert_eq!(groups[1].avg_temp, 26.0);
        assert_eq!(groups[1].min_temp, 24.0);
        assert_eq!(groups[1].max_temp, 28.0);
        assert_eq!(groups[2].date, "2026-10-20");
    }

    #[tokio::test]
    async fn test_cleaning_log_run_ids_increase() {
        let (pool, _dir) = test_pool().await;
        let first = insert_cleaning_log(&pool, "2026-10-19 10:00:00", 4, 1, 3)
            .await
            .unwrap();
        let second = insert_cleaning_log(&pool, "2026-10-19 10:05:00", 8, 3, 5)
            .await
            .unwrap();
        assert!(second > first);

        let runs = list_cleaning_runs(&pool).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, second);
        assert_eq!(runs[1].total_records, 4);
    }

    #[tokio::test]
    async fn test_list_daily_summaries_filters_by_city() {
        let (pool, _dir) = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        for city in ["Tokyo", "London"] {
            let summary = DailySummary {
                city: city.to_string(),
                date: "2026-10-19".to_string(),
                avg_temp: 22.0,
                min_temp: 20.0,
                max_temp: 24.0,
                category: "Warm".to_string(),
            };
            upsert_daily_summary(&mut conn, &summary).await.unwrap();
        }
        drop(conn);

        assert_eq!(list_daily_summaries(&pool, None).await.unwrap().len(), 2);
        let tokyo = list_daily_summaries(&pool, Some("Tokyo")).await.unwrap();
        assert_eq!(tokyo.len(), 1);
        assert_eq!(tokyo[0].city, "Tokyo");
    }
}
