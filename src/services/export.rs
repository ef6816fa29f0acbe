//! CSV export of stored observations.

use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

use crate::config::TemperatureThresholds;
use crate::db::models::WeatherObservation;
use crate::db::{queries, schema};
use crate::errors::AppError;

/// Only warm-filtered rows are stored, so "Warm" is the lowest category here.
fn export_category(temperature: f64, thresholds: &TemperatureThresholds) -> &'static str {
    if temperature >= thresholds.hot {
        "Hot"
    } else {
        "Warm"
    }
}

/// Write observations as CSV to `writer`.
pub fn write_weather_csv<W: std::io::Write>(
    writer: W,
    rows: &[WeatherObservation],
    thresholds: &TemperatureThresholds,
) -> Result<(), AppError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["City", "Date", "Condition", "Temperature", "Category"])?;
    for row in rows {
        let temperature = row.temperature.to_string();
        csv_writer.write_record([
            row.city.as_str(),
            row.fetched_at.as_str(),
            row.condition.as_str(),
            temperature.as_str(),
            export_category(row.temperature, thresholds),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Export every `weather` row to `<output_folder>/warm_cities_<date>.csv`.
pub async fn export_weather_csv(
    pool: &SqlitePool,
    output_folder: &Path,
    thresholds: &TemperatureThresholds,
    date: NaiveDate,
) -> Result<PathBuf, AppError> {
    schema::ensure_ingest_tables(pool).await?;
    let rows = queries::list_weather(pool).await?;

    std::fs::create_dir_all(output_folder)?;
    let path = output_folder.join(format!("warm_cities_{}.csv", date.format("%Y-%m-%d")));
    let file = std::fs::File::create(&path)?;
    write_weather_csv(file, &rows, thresholds)?;

    tracing::info!("Exported {} weather rows to {}", rows.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;

    fn obs(city: &str, temperature: f64) -> WeatherObservation {
        WeatherObservation {
            city: city.to_string(),
            fetched_at: "2026-10-19 15:00:00".to_string(),
            condition: "Sunny".to_string(),
            temperature,
        }
    }

    #[test]
    fn test_write_weather_csv() {
        let mut out = Vec::new();
        write_weather_csv(
            &mut out,
            &[obs("Tokyo", 25.5), obs("Chennai", 33.0)],
            &TemperatureThresholds::default(),
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "City,Date,Condition,Temperature,Category");
        assert_eq!(lines[1], "Tokyo,2026-10-19 15:00:00,Sunny,25.5,Warm");
        assert_eq!(lines[2], "Chennai,2026-10-19 15:00:00,Sunny,33,Hot");
    }

    #[tokio::test]
    async fn test_export_creates_dated_file() {
        let (pool, dir) = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        queries::insert_weather_observation(&mut conn, &obs("Tokyo", 27.0))
            .await
            .unwrap();
        drop(conn);

        let out_dir = dir.path().join("exports");
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let path = export_weather_csv(&pool, &out_dir, &TemperatureThresholds::default(), date)
            .await
            .unwrap();

        assert_eq!(path, out_dir.join("warm_cities_2026-10-19.csv"));
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
