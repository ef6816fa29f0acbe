//! Record validation shared by the cleaning pipeline and the ingestion job.
//!
//! A malformed record is a normal outcome here, never an error: the validator
//! either produces a `ValidatedObservation` or says why it turned the record down.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Untyped input record. Every field is raw text and may be padded, empty
/// or non-numeric. Missing JSON keys read as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub city: String,
    pub temperature: String,
    pub condition: String,
}

impl RawRecord {
    pub fn new(city: &str, temperature: &str, condition: &str) -> Self {
        Self {
            city: city.to_string(),
            temperature: temperature.to_string(),
            condition: condition.to_string(),
        }
    }
}

/// A record that passed every validation predicate. Fields are trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedObservation {
    pub city: String,
    pub temperature: f64,
    pub condition: String,
}

/// Inclusive temperature sanity band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempRange {
    pub min: f64,
    pub max: f64,
}

impl TempRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// NaN is never contained.
    pub fn contains(&self, t: f64) -> bool {
        (self.min..=self.max).contains(&t)
    }
}

impl Default for TempRange {
    fn default() -> Self {
        Self::new(-50.0, 60.0)
    }
}

/// Why a record was excluded from the clean dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    EmptyCity,
    EmptyCondition,
    UnparseableTemperature(String),
    OutOfRange(f64),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::EmptyCity => write!(f, "empty city"),
            Rejection::EmptyCondition => write!(f, "empty condition"),
            Rejection::UnparseableTemperature(raw) => {
                write!(f, "temperature '{}' is not a number", raw)
            }
            Rejection::OutOfRange(t) => write!(f, "temperature {} outside sanity band", t),
        }
    }
}

/// Classify one raw record.
///
/// The temperature is parsed first, then city, condition and range are
/// checked. The order only decides which `Rejection` is reported when a record
/// fails several checks.
pub fn validate_record(
    record: &RawRecord,
    range: TempRange,
) -> Result<ValidatedObservation, Rejection> {
    let city = record.city.trim();
    let condition = record.condition.trim();
    let raw_temp = record.temperature.trim();

    let temperature: f64 = raw_temp
        .parse()
        .map_err(|_| Rejection::UnparseableTemperature(raw_temp.to_string()))?;

    if city.is_empty() {
        return Err(Rejection::EmptyCity);
    }
    if condition.is_empty() {
        return Err(Rejection::EmptyCondition);
    }
    if !range.contains(temperature) {
        return Err(Rejection::OutOfRange(temperature));
    }

    Ok(ValidatedObservation {
        city: city.to_string(),
        temperature,
        condition: condition.to_string(),
    })
}
