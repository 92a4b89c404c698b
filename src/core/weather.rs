//! Weather abstractions and core types

use crate::core::error::FetchError;
use crate::providers::util::{RetryPolicy, with_retry};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    /// The `units` parameter understood by OpenWeatherMap.
    pub fn as_owm_param(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Units::Metric => "°C",
            Units::Imperial => "°F",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub feels_like: f64,
    pub summary: String,
    pub description: String,
    pub icon: Option<String>,
}

/// One day of low/high temperature and precipitation, past or forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub precipitation_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Resolved display name, e.g. "London, GB".
    pub location: String,
    pub units: Units,
    pub current: CurrentConditions,
    pub history: Vec<DailySummary>,
    pub forecast: Vec<DailySummary>,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch_weather(&self, location: &str) -> Result<WeatherSnapshot, FetchError>;
}

/// Daily history source, keyed by coordinates.
#[async_trait]
pub trait WeatherHistoryProvider: Send + Sync {
    async fn fetch_history(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
        units: Units,
    ) -> Result<Vec<DailySummary>, FetchError>;
}

/// Fetches every location concurrently. A failed location carries its error
/// in the returned map and never prevents the others from completing.
pub async fn fetch_locations(
    provider: &dyn WeatherProvider,
    locations: &[String],
    policy: RetryPolicy,
) -> BTreeMap<String, Result<WeatherSnapshot, FetchError>> {
    let futures = locations.iter().map(|location| async move {
        let result = with_retry(|| provider.fetch_weather(location), policy).await;
        (location.clone(), result)
    });
    join_all(futures).await.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockWeatherProvider;

    #[async_trait]
    impl WeatherProvider for MockWeatherProvider {
        async fn fetch_weather(&self, location: &str) -> Result<WeatherSnapshot, FetchError> {
            if location.starts_with("Atlantis") {
                return Err(FetchError::NotFound(location.to_string()));
            }
            Ok(WeatherSnapshot {
                location: location.to_string(),
                units: Units::Metric,
                current: CurrentConditions {
                    temperature: 21.5,
                    feels_like: 20.0,
                    summary: "Clear".into(),
                    description: "clear sky".into(),
                    icon: None,
                },
                history: Vec::new(),
                forecast: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_fetch_locations_keeps_partial_failures() {
        let locations = vec![
            "Toronto,CA".to_string(),
            "Atlantis,XX".to_string(),
            "London,GB".to_string(),
        ];
        let results = fetch_locations(&MockWeatherProvider, &locations, RetryPolicy::none()).await;

        assert_eq!(results.len(), 3);
        assert!(results["Toronto,CA"].is_ok());
        assert!(results["London,GB"].is_ok());
        assert_eq!(
            results["Atlantis,XX"].as_ref().unwrap_err(),
            &FetchError::NotFound("Atlantis,XX".into())
        );
    }

    #[test]
    fn test_units_params() {
        assert_eq!(Units::default(), Units::Metric);
        assert_eq!(Units::Imperial.as_owm_param(), "imperial");
        assert_eq!(Units::Imperial.temperature_symbol(), "°F");
    }
}
