use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::cache::TtlCache;
use crate::core::error::FetchError;
use crate::core::weather::{DailySummary, Units, WeatherHistoryProvider};
use crate::providers::util::get_json;

const HISTORY_TTL: Duration = Duration::from_secs(12 * 3600);

/// Daily trailing history from the Open-Meteo archive API.
pub struct OpenMeteoProvider {
    base_url: String,
    client: reqwest::Client,
    cache: TtlCache<String, Vec<DailySummary>>,
}

impl OpenMeteoProvider {
    pub fn new(base_url: &str, client: reqwest::Client) -> Self {
        OpenMeteoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            cache: TtlCache::new(HISTORY_TTL),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    daily: DailySeries,
}

#[derive(Debug, Deserialize)]
struct DailySeries {
    time: Vec<String>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
}

impl DailySeries {
    fn into_summaries(self, target: &str) -> Result<Vec<DailySummary>, FetchError> {
        self.time
            .iter()
            .enumerate()
            .map(|(i, day)| {
                let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .map_err(|e| FetchError::malformed(target, e))?;
                Ok(DailySummary {
                    date,
                    low: self.temperature_2m_min.get(i).copied().flatten(),
                    high: self.temperature_2m_max.get(i).copied().flatten(),
                    precipitation_mm: self.precipitation_sum.get(i).copied().flatten().unwrap_or(0.0),
                })
            })
            .collect()
    }
}

#[async_trait]
impl WeatherHistoryProvider for OpenMeteoProvider {
    #[instrument(name = "OpenMeteoHistoryFetch", skip(self))]
    async fn fetch_history(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
        units: Units,
    ) -> Result<Vec<DailySummary>, FetchError> {
        let target = format!("{lat:.4},{lon:.4}");
        let key = format!("{target}:{start}:{end}:{units:?}");
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let temperature_unit = match units {
            Units::Metric => "celsius",
            Units::Imperial => "fahrenheit",
        };
        let url = Url::parse_with_params(
            &format!("{}/v1/archive", self.base_url),
            &[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("start_date", start.to_string()),
                ("end_date", end.to_string()),
                (
                    "daily",
                    "temperature_2m_max,temperature_2m_min,precipitation_sum".to_string(),
                ),
                ("temperature_unit", temperature_unit.to_string()),
                ("timezone", "UTC".to_string()),
            ],
        )
        .map_err(|e| FetchError::network(&target, e))?;
        debug!("Requesting weather history from {}", url);

        let data: ArchiveResponse = get_json(self.client.get(url), &target).await?;
        let days = data.daily.into_summaries(&target)?;
        self.cache.put(key, days.clone()).await;
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_history_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/archive"))
            .and(query_param("start_date", "2024-03-01"))
            .and(query_param("end_date", "2024-03-03"))
            .and(query_param("temperature_unit", "fahrenheit"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"daily": {
                    "time": ["2024-03-01", "2024-03-02", "2024-03-03"],
                    "temperature_2m_max": [50.1, 48.0, null],
                    "temperature_2m_min": [38.5, 36.2, null],
                    "precipitation_sum": [0.0, 3.4, null]
                }}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenMeteoProvider::new(&server.uri(), reqwest::Client::new());
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();

        let days = provider
            .fetch_history(43.65, -79.38, start, end, Units::Imperial)
            .await
            .unwrap();
        assert_eq!(days.len(), 3);
        assert_eq!(days[0].high, Some(50.1));
        assert_eq!(days[1].precipitation_mm, 3.4);
        assert_eq!(days[2].low, None);
        assert_eq!(days[2].precipitation_mm, 0.0);

        // Second call is served from the cache.
        let again = provider
            .fetch_history(43.65, -79.38, start, end, Units::Imperial)
            .await
            .unwrap();
        assert_eq!(again, days);
    }

    #[tokio::test]
    async fn test_malformed_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/archive"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"daily": {"time": ["yesterday"], "temperature_2m_max": [1.0], "temperature_2m_min": [0.0]}}"#,
            ))
            .mount(&server)
            .await;

        let provider = OpenMeteoProvider::new(&server.uri(), reqwest::Client::new());
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let err = provider
            .fetch_history(0.0, 0.0, day, day, Units::Metric)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }
}
