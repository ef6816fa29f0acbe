//! Plain-text summary report over the cleaned dataset.

use chrono::Local;
use sqlx::SqlitePool;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::TemperatureThresholds;
use crate::db::models::CleanedRecord;
use crate::db::{queries, schema};
use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub hot_cities: usize,
    pub warm_cities: usize,
    pub cold_cities: usize,
    pub hottest: (String, f64),
    pub coldest: (String, f64),
}

impl fmt::Display for WeatherReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Weather Summary Report")?;
        writeln!(f, "-------------------------")?;
        writeln!(f, "Hot cities : {}", self.hot_cities)?;
        writeln!(f, "Warm cities : {}", self.warm_cities)?;
        writeln!(f, "Cold cities : {}", self.cold_cities)?;
        writeln!(f, "Hottest City : {} ({}°C)", self.hottest.0, self.hottest.1)?;
        write!(f, "Coldest City : {} ({}°C)", self.coldest.0, self.coldest.1)
    }
}

/// Build the report from rows sorted hottest first. `None` when there are no rows.
pub fn build_report(rows: &[CleanedRecord], thresholds: &TemperatureThresholds) -> Option<WeatherReport> {
    let hottest = rows.first()?;
    let coldest = rows.last()?;

    let mut report = WeatherReport {
        hot_cities: 0,
        warm_cities: 0,
        cold_cities: 0,
        hottest: (hottest.city.clone(), hottest.temperature),
        coldest: (coldest.city.clone(), coldest.temperature),
    };
    for row in rows {
        if row.temperature >= thresholds.hot {
            report.hot_cities += 1;
        } else if row.temperature >= thresholds.warm {
            report.warm_cities += 1;
        } else {
            report.cold_cities += 1;
        }
    }
    Some(report)
}

/// Write `weather_report_<timestamp>.txt` into `output_folder`.
///
/// Returns `None` without writing anything when `cleaned_weather` is empty.
pub async fn generate_weather_report(
    pool: &SqlitePool,
    thresholds: &TemperatureThresholds,
    output_folder: &Path,
) -> Result<Option<PathBuf>, AppError> {
    schema::ensure_cleaned_table(pool).await?;
    let rows = queries::list_cleaned_by_temperature(pool).await?;

    let Some(report) = build_report(&rows, thresholds) else {
        tracing::info!("No data available to generate report");
        return Ok(None);
    };

    std::fs::create_dir_all(output_folder)?;
    let filename = format!(
        "weather_report_{}.txt",
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let path = output_folder.join(filename);
    std::fs::write(&path, report.to_string())?;

    tracing::info!("Report saved to {}", path.display());
    Ok(Some(path))
}
