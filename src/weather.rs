//! Current-conditions lookup against weatherapi.com.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured fields the router phrases into a weather answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    /// Resolved location name.
    pub location: String,
    /// Temperature in degrees Celsius.
    pub temp_c: f64,
    /// Short condition text, e.g. "Light rain".
    pub condition: String,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Wind speed in km/h.
    pub wind_kph: f64,
}

impl CurrentConditions {
    /// Prompt body fed to the generation provider.
    pub fn report_prompt(&self) -> String {
        format!(
            "Generate a weather report for {}:\n\n\
             Temperature: {}°C\n\
             Condition: {}\n\
             Humidity: {}%\n\
             Wind Speed: {} kph\n",
            self.location, self.temp_c, self.condition, self.humidity, self.wind_kph
        )
    }
}

/// Weather lookup failure.
#[derive(Error, Debug)]
pub enum WeatherError {
    /// The provider answered with an error or could not be reached.
    #[error("weather provider error: {0}")]
    Provider(String),

    /// The call exceeded the call-site timeout.
    #[error("weather request timed out after {0}s")]
    Timeout(u64),
}

/// External data provider for the weather intent.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Current conditions for `city`.
    async fn fetch_current_conditions(&self, city: &str)
        -> Result<CurrentConditions, WeatherError>;
}

/// weatherapi.com `current.json` client.
pub struct WeatherApiClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl WeatherApiClient {
    /// Builds a client for `{base_url}/current.json`.
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing weather API key");
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build weather HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/current.json", base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiClient {
    async fn fetch_current_conditions(
        &self,
        city: &str,
    ) -> Result<CurrentConditions, WeatherError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("key", self.api_key.trim()), ("q", city)])
            .send()
            .await
            .map_err(|err| WeatherError::Provider(err.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(WeatherError::Provider(format!(
                "weather API returned {}: {}",
                status, body
            )));
        }
        let payload: CurrentResponse = resp
            .json()
            .await
            .map_err(|err| WeatherError::Provider(format!("invalid weather payload: {err}")))?;
        Ok(payload.into())
    }
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    location: LocationBlock,
    current: CurrentBlock,
}

#[derive(Debug, Deserialize)]
struct LocationBlock {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    temp_c: f64,
    condition: ConditionBlock,
    humidity: f64,
    wind_kph: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    text: String,
}

impl From<CurrentResponse> for CurrentConditions {
    fn from(resp: CurrentResponse) -> Self {
        Self {
            location: resp.location.name,
            temp_c: resp.current.temp_c,
            condition: resp.current.condition.text,
            humidity: resp.current.humidity,
            wind_kph: resp.current.wind_kph,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_current_payload() {
        let raw = r#"{
            "location": {"name": "Boston", "region": "Massachusetts"},
            "current": {
                "temp_c": 11.5,
                "condition": {"text": "Light rain", "code": 1183},
                "humidity": 87,
                "wind_kph": 19.1
            }
        }"#;
        let parsed: CurrentResponse = serde_json::from_str(raw).unwrap();
        let conditions = CurrentConditions::from(parsed);
        assert_eq!(conditions.location, "Boston");
        assert_eq!(conditions.condition, "Light rain");
        assert_eq!(conditions.humidity, 87.0);
    }

    #[test]
    fn report_prompt_lists_fields() {
        let conditions = CurrentConditions {
            location: "Boston".into(),
            temp_c: 11.5,
            condition: "Light rain".into(),
            humidity: 87.0,
            wind_kph: 19.1,
        };
        let prompt = conditions.report_prompt();
        assert!(prompt.starts_with("Generate a weather report for Boston:"));
        assert!(prompt.contains("Temperature: 11.5°C"));
        assert!(prompt.contains("Humidity: 87%"));
        assert!(prompt.contains("Wind Speed: 19.1 kph"));
    }
}
