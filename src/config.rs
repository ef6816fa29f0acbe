use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::AppError;
use crate::services::validator::TempRange;

/// Upper bound on cleaning workers, from config or the command line.
pub const MAX_WORKER_COUNT: usize = 64;

/// Cut-offs used to classify temperatures as hot / warm / cool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureThresholds {
    pub hot: f64,
    pub warm: f64,
}

impl Default for TemperatureThresholds {
    fn default() -> Self {
        Self {
            hot: 30.0,
            warm: 20.0,
        }
    }
}

/// Application configuration, read from a JSON file or from environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: String,
    pub output_folder: String,
    pub temperature_thresholds: TemperatureThresholds,
    pub weather_base_url: String,
    pub request_timeout_secs: u64,
    pub cities: Vec<String>,
    /// Parallel cleaning workers.
    pub worker_count: usize,
    /// Sanity band for validation, inclusive on both ends.
    pub min_temp: f64,
    pub max_temp: f64,
    pub ingest_interval_secs: u64,
    /// Local time of day ("HH:MM") for the daily summary job.
    pub summary_time: String,
    /// Local time of day ("HH:MM") for the CSV export job.
    pub export_time: String,
    pub port: u16,
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "weather.db".to_string(),
            output_folder: "reports".to_string(),
            temperature_thresholds: TemperatureThresholds::default(),
            weather_base_url: "https://wttr.in".to_string(),
            request_timeout_secs: 10,
            cities: ["London", "Hyderabad", "Kolkata", "Chennai", "Auckland", "Tokyo"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            worker_count: 4,
            min_temp: -50.0,
            max_temp: 60.0,
            ingest_interval_secs: 60,
            summary_time: "15:54".to_string(),
            export_time: "15:55".to_string(),
            port: 8080,
            log_dir: "logs".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            AppError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let config = Self {
            db_path: env_or("DB_PATH", defaults.db_path)?,
            output_folder: env_or("OUTPUT_FOLDER", defaults.output_folder)?,
            temperature_thresholds: TemperatureThresholds {
                hot: env_or("HOT_THRESHOLD", defaults.temperature_thresholds.hot)?,
                warm: env_or("WARM_THRESHOLD", defaults.temperature_thresholds.warm)?,
            },
            weather_base_url: env_or("WEATHER_BASE_URL", defaults.weather_base_url)?,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            cities: match std::env::var("CITIES") {
                Ok(raw) => parse_city_list(&raw),
                Err(_) => defaults.cities,
            },
            worker_count: env_or("WORKER_COUNT", defaults.worker_count)?,
            min_temp: env_or("MIN_TEMP", defaults.min_temp)?,
            max_temp: env_or("MAX_TEMP", defaults.max_temp)?,
            ingest_interval_secs: env_or("INGEST_INTERVAL_SECS", defaults.ingest_interval_secs)?,
            summary_time: env_or("SUMMARY_TIME", defaults.summary_time)?,
            export_time: env_or("EXPORT_TIME", defaults.export_time)?,
            port: env_or("PORT", defaults.port)?,
            log_dir: env_or("LOG_DIR", defaults.log_dir)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        check_worker_count(self.worker_count)?;
        if self.min_temp > self.max_temp {
            return Err(AppError::Config(format!(
                "min_temp ({}) is above max_temp ({})",
                self.min_temp, self.max_temp
            )));
        }
        if self.temperature_thresholds.warm > self.temperature_thresholds.hot {
            return Err(AppError::Config(format!(
                "warm threshold ({}) is above hot threshold ({})",
                self.temperature_thresholds.warm, self.temperature_thresholds.hot
            )));
        }
        if self.ingest_interval_secs == 0 {
            return Err(AppError::Config("ingest_interval_secs must be positive".into()));
        }
        if self.cities.is_empty() {
            return Err(AppError::Config("city list is empty".into()));
        }
        self.summary_time()?;
        self.export_time()?;
        Ok(())
    }

    pub fn temp_range(&self) -> TempRange {
        TempRange::new(self.min_temp, self.max_temp)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.ingest_interval_secs)
    }

    pub fn summary_time(&self) -> Result<NaiveTime, AppError> {
        parse_time_of_day(&self.summary_time)
    }

    pub fn export_time(&self) -> Result<NaiveTime, AppError> {
        parse_time_of_day(&self.export_time)
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{} has an invalid value '{}': {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}

/// Reject a worker count of 0 or above `MAX_WORKER_COUNT`.
pub fn check_worker_count(workers: usize) -> Result<usize, AppError> {
    if workers == 0 || workers > MAX_WORKER_COUNT {
        return Err(AppError::Config(format!(
            "worker count must be between 1 and {}, got {}",
            MAX_WORKER_COUNT, workers
        )));
    }
    Ok(workers)
}

fn parse_city_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_time_of_day(raw: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| AppError::Config(format!("'{}' is not a HH:MM time: {}", raw, e)))
}
