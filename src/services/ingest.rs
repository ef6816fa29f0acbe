//! Ingestion job: one scheduler tick over the configured city list.
//!
//! Each city is handled on its own. A transport, validation, persistence or
//! unexpected failure for one city is logged and recorded in the report, and
//! the loop moves on to the next city.

use sqlx::SqlitePool;

use crate::db::models::WeatherObservation;
use crate::db::{now_timestamp, queries, schema};
use crate::errors::AppError;
use crate::services::validator::{validate_record, RawRecord, Rejection, TempRange};
use crate::services::wttr::WttrClient;

/// What happened to one city during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum CityOutcome {
    /// Observation and freshness rows written.
    Stored { temperature: f64 },
    /// Valid, but not above the warm threshold, so not persisted.
    BelowThreshold { temperature: f64 },
    /// Failed validation; counted as skipped.
    Rejected(Rejection),
    TransportFailed(String),
    PersistFailed(String),
    Unexpected(String),
}

impl CityOutcome {
    fn is_failure(&self) -> bool {
        matches!(
            self,
            CityOutcome::TransportFailed(_)
                | CityOutcome::PersistFailed(_)
                | CityOutcome::Unexpected(_)
        )
    }
}

/// Per-city outcomes of one ingestion run, in city-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub cities: Vec<(String, CityOutcome)>,
}

impl IngestReport {
    pub fn stored(&self) -> usize {
        self.count(|o| matches!(o, CityOutcome::Stored { .. }))
    }

    pub fn below_threshold(&self) -> usize {
        self.count(|o| matches!(o, CityOutcome::BelowThreshold { .. }))
    }

    /// Cities dropped by validation.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, CityOutcome::Rejected(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(CityOutcome::is_failure)
    }

    pub fn outcome(&self, city: &str) -> Option<&CityOutcome> {
        self.cities
            .iter()
            .find(|(name, _)| name == city)
            .map(|(_, outcome)| outcome)
    }

    fn count(&self, pred: impl Fn(&CityOutcome) -> bool) -> usize {
        self.cities.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Settings for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub cities: Vec<String>,
    pub range: TempRange,
    /// Only temperatures strictly above this are persisted.
    pub warm_threshold: f64,
}

/// Run one ingestion tick.
///
/// Only a failure to create the tables aborts the run. Everything after that
/// is isolated per city.
pub async fn run_ingestion(
    pool: &SqlitePool,
    client: &WttrClient,
    settings: &IngestSettings,
) -> Result<IngestReport, AppError> {
    schema::ensure_ingest_tables(pool).await?;

    let mut report = IngestReport::default();
    for city in &settings.cities {
        let outcome = ingest_city(pool, client, city, settings).await;
        report.cities.push((city.clone(), outcome));
    }

    tracing::info!("Skipped {} records in this run", report.skipped());
    tracing::info!(
        "Ingestion run complete: {} stored, {} below threshold, {} skipped, {} failed",
        report.stored(),
        report.below_threshold(),
        report.skipped(),
        report.failed(),
    );

    Ok(report)
}

async fn ingest_city(
    pool: &SqlitePool,
    client: &WttrClient,
    city: &str,
    settings: &IngestSettings,
) -> CityOutcome {
    let conditions = match client.fetch_current(city).await {
        Ok(c) => c,
        Err(AppError::Transport(msg)) => {
            tracing::warn!("API error for {}: {}", city, msg);
            return CityOutcome::TransportFailed(msg);
        }
        Err(e) => {
            tracing::error!(severity = "critical", "Unexpected error for {}: {}", city, e);
            return CityOutcome::Unexpected(e.to_string());
        }
    };
    let fetched_at = now_timestamp();

    let raw = RawRecord::new(city, &conditions.temperature_raw, &conditions.condition);
    let validated = match validate_record(&raw, settings.range) {
        Ok(v) => v,
        Err(rejection) => {
            tracing::info!("Invalid data skipped for {}: {}", city, rejection);
            return CityOutcome::Rejected(rejection);
        }
    };

    if validated.temperature <= settings.warm_threshold {
        tracing::debug!(
            "{} at {}°C is not above {}°C, not stored",
            city,
            validated.temperature,
            settings.warm_threshold
        );
        return CityOutcome::BelowThreshold {
            temperature: validated.temperature,
        };
    }

    let observation = WeatherObservation {
        city: validated.city,
        fetched_at,
        condition: validated.condition,
        temperature: validated.temperature,
    };

    match persist_observation(pool, &observation).await {
        Ok(()) => {
            tracing::info!(
                "Weather fetched and saved for {}: {}, {}°C, humidity {}%",
                observation.city,
                observation.condition,
                observation.temperature,
                conditions.humidity.as_deref().unwrap_or("?"),
            );
            CityOutcome::Stored {
                temperature: observation.temperature,
            }
        }
        Err(e) => {
            tracing::error!("DB error for {}: {}", city, e);
            CityOutcome::PersistFailed(e.to_string())
        }
    }
}

/// Append the observation and bump the city's freshness row atomically.
async fn persist_observation(
    pool: &SqlitePool,
    observation: &WeatherObservation,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    queries::insert_weather_observation(&mut tx, observation).await?;
    queries::upsert_city_freshness(&mut tx, &observation.city, &observation.fetched_at).await?;
    tx.commit().await
}
