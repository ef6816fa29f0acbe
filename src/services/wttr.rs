//! wttr.in current-conditions client.
//!
//! Requests `<base>/<city>?format=j1` and pulls the few fields the ingestion
//! job needs out of `current_condition[0]`.

use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

use crate::errors::AppError;

/// Client for the wttr.in JSON ("j1") format.
#[derive(Debug, Clone)]
pub struct WttrClient {
    client: reqwest::Client,
    base_url: Url,
}

/// Current conditions for one city, as reported by the remote source.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub condition: String,
    /// `temp_C` exactly as received. The validator decides whether it is numeric.
    pub temperature_raw: String,
    pub humidity: Option<String>,
}

// --- wttr.in JSON response types ---

#[derive(Debug, Deserialize)]
struct WttrResponse {
    current_condition: Vec<WttrCurrentCondition>,
}

#[derive(Debug, Deserialize)]
struct WttrCurrentCondition {
    #[serde(rename = "temp_C")]
    temp_c: Option<serde_json::Value>,
    humidity: Option<serde_json::Value>,
    #[serde(rename = "weatherDesc", default)]
    weather_desc: Vec<WttrValue>,
}

#[derive(Debug, Deserialize)]
struct WttrValue {
    value: String,
}

/// wttr.in sends numbers as strings; accept either.
fn scalar_to_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl WttrClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid weather base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "Weather base URL '{}' cannot carry a path",
                base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    fn city_url(&self, city: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(city);
        }
        url.query_pairs_mut().append_pair("format", "j1");
        url
    }

    /// Fetch current conditions for `city`.
    ///
    /// Network failures, timeouts and non-2xx statuses are `AppError::Transport`.
    /// A body that is not the expected JSON shape is `AppError::MalformedResponse`.
    pub async fn fetch_current(&self, city: &str) -> Result<CurrentConditions, AppError> {
        let url = self.city_url(city);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("wttr.in request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Transport(format!(
                "wttr.in returned HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::Transport(format!("wttr.in body read failed: {}", e)))?;

        parse_current_conditions(&body)
    }
}

/// Pull condition, temperature and humidity out of a j1 body. No I/O.
pub fn parse_current_conditions(body: &str) -> Result<CurrentConditions, AppError> {
    let parsed: WttrResponse = serde_json::from_str(body)
        .map_err(|e| AppError::MalformedResponse(format!("wttr.in JSON parse error: {}", e)))?;

    let current = parsed.current_condition.into_iter().next().ok_or_else(|| {
        AppError::MalformedResponse("wttr.in returned no current_condition".to_string())
    })?;

    let condition = current
        .weather_desc
        .into_iter()
        .next()
        .map(|d| d.value)
        .ok_or_else(|| AppError::MalformedResponse("missing weatherDesc[0].value".to_string()))?;

    let temperature_raw = current
        .temp_c
        .as_ref()
        .and_then(scalar_to_text)
        .ok_or_else(|| AppError::MalformedResponse("missing temp_C".to_string()))?;

    Ok(CurrentConditions {
        condition,
        temperature_raw,
        humidity: current.humidity.as_ref().and_then(scalar_to_text),
    })
}
