use async_trait::async_trait;
use chrono::{Days, NaiveDate, TimeZone, Utc};
use reqwest::Url;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::cache::TtlCache;
use crate::core::error::FetchError;
use crate::core::weather::{
    CurrentConditions, DailySummary, Units, WeatherHistoryProvider, WeatherProvider,
    WeatherSnapshot,
};
use crate::providers::util::get_json;

const GEOCODE_TTL: Duration = Duration::from_secs(24 * 3600);
const CURRENT_TTL: Duration = Duration::from_secs(5 * 60);
const FORECAST_TTL: Duration = Duration::from_secs(30 * 60);
const FORECAST_DAYS: usize = 5;
const HISTORY_DAYS: u64 = 7;

#[derive(Debug, Clone, PartialEq)]
struct GeoPoint {
    lat: f64,
    lon: f64,
    name: String,
}

/// Splits "City,CC" and maps the country aliases OpenWeatherMap rejects.
fn split_location(location: &str) -> (String, Option<String>) {
    let mut parts = location.split(',').map(str::trim);
    let city = parts.next().unwrap_or_default().to_string();
    let country = parts
        .next()
        .filter(|cc| !cc.is_empty())
        .map(|cc| match cc.to_uppercase().as_str() {
            "UK" | "GBR" => "GB".to_string(),
            "USA" => "US".to_string(),
            other => other.to_string(),
        });
    (city, country)
}

/// Groups 3-hourly forecast entries by UTC date into daily low/high and
/// summed rain, keeping the first few days.
fn aggregate_forecast(entries: &[ForecastEntry]) -> Vec<DailySummary> {
    let mut days: BTreeMap<NaiveDate, DailySummary> = BTreeMap::new();

    for entry in entries {
        let Some(date) = Utc.timestamp_opt(entry.dt, 0).single().map(|d| d.date_naive()) else {
            continue;
        };
        let temp = entry.main.temp;
        let rain = entry.rain.as_ref().and_then(|r| r.three_hours).unwrap_or(0.0);

        let day = days.entry(date).or_insert(DailySummary {
            date,
            low: Some(temp),
            high: Some(temp),
            precipitation_mm: 0.0,
        });
        day.low = day.low.map(|low| low.min(temp));
        day.high = day.high.map(|high| high.max(temp));
        day.precipitation_mm += rain;
    }

    days.into_values().take(FORECAST_DAYS).collect()
}

/// Current conditions and forecast from OpenWeatherMap; the trailing history
/// comes from a separate provider keyed by the geocoded coordinates.
pub struct OpenWeatherProvider {
    base_url: String,
    api_key: String,
    units: Units,
    client: reqwest::Client,
    history: Arc<dyn WeatherHistoryProvider>,
    geocode_cache: TtlCache<String, GeoPoint>,
    current_cache: TtlCache<String, CurrentConditions>,
    forecast_cache: TtlCache<String, Vec<DailySummary>>,
}

impl OpenWeatherProvider {
    pub fn new(
        base_url: &str,
        api_key: &str,
        units: Units,
        client: reqwest::Client,
        history: Arc<dyn WeatherHistoryProvider>,
    ) -> Self {
        OpenWeatherProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            units,
            client,
            history,
            geocode_cache: TtlCache::new(GEOCODE_TTL),
            current_cache: TtlCache::new(CURRENT_TTL),
            forecast_cache: TtlCache::new(FORECAST_TTL),
        }
    }

    fn url(&self, path: &str, params: &[(&str, String)], target: &str) -> Result<Url, FetchError> {
        let mut params = params.to_vec();
        params.push(("appid", self.api_key.clone()));
        Url::parse_with_params(&format!("{}{}", self.base_url, path), &params)
            .map_err(|e| FetchError::network(target, e))
    }

    fn coord_params(&self, point: &GeoPoint) -> Vec<(&'static str, String)> {
        vec![
            ("lat", point.lat.to_string()),
            ("lon", point.lon.to_string()),
            ("units", self.units.as_owm_param().to_string()),
        ]
    }

    async fn geocode(&self, location: &str) -> Result<GeoPoint, FetchError> {
        let key = location.trim().to_lowercase();
        if let Some(cached) = self.geocode_cache.get(&key).await {
            return Ok(cached);
        }

        let (city, country) = split_location(location);
        let mut queries = Vec::new();
        if let Some(cc) = &country {
            queries.push(format!("{city},{cc}"));
        }
        queries.push(city.clone());

        for q in queries {
            let url = self.url(
                "/geo/1.0/direct",
                &[("q", q.clone()), ("limit", "1".to_string())],
                location,
            )?;
            debug!("Geocoding {} via {}", location, q);
            let hits: Vec<GeocodeHit> = get_json(self.client.get(url), location).await?;
            if let Some(hit) = hits.into_iter().next() {
                let name = match hit.country.as_deref() {
                    Some(cc) if !cc.is_empty() => format!("{}, {}", hit.name, cc),
                    _ => hit.name,
                };
                let point = GeoPoint {
                    lat: hit.lat,
                    lon: hit.lon,
                    name,
                };
                self.geocode_cache.put(key, point.clone()).await;
                return Ok(point);
            }
        }

        Err(FetchError::NotFound(location.to_string()))
    }

    async fn current(&self, point: &GeoPoint) -> Result<CurrentConditions, FetchError> {
        if let Some(cached) = self.current_cache.get(&point.name).await {
            return Ok(cached);
        }

        let url = self.url("/data/2.5/weather", &self.coord_params(point), &point.name)?;
        let data: CurrentResponse = get_json(self.client.get(url), &point.name).await?;
        let summary = data
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::malformed(&point.name, "no weather entry"))?;

        let conditions = CurrentConditions {
            temperature: data.main.temp,
            feels_like: data.main.feels_like,
            summary: summary.main,
            description: summary.description,
            icon: summary.icon,
        };
        self.current_cache
            .put(point.name.clone(), conditions.clone())
            .await;
        Ok(conditions)
    }

    async fn forecast(&self, point: &GeoPoint) -> Result<Vec<DailySummary>, FetchError> {
        if let Some(cached) = self.forecast_cache.get(&point.name).await {
            return Ok(cached);
        }

        let url = self.url("/data/2.5/forecast", &self.coord_params(point), &point.name)?;
        let data: ForecastResponse = get_json(self.client.get(url), &point.name).await?;
        let days = aggregate_forecast(&data.list);
        self.forecast_cache
            .put(point.name.clone(), days.clone())
            .await;
        Ok(days)
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    name: String,
    lat: f64,
    lon: f64,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WeatherEntry {
    main: String,
    description: String,
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentMain {
    temp: f64,
    feels_like: f64,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    weather: Vec<WeatherEntry>,
    main: CurrentMain,
}

#[derive(Debug, Deserialize)]
struct ForecastMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastRain {
    #[serde(rename = "3h")]
    three_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    dt: i64,
    main: ForecastMain,
    rain: Option<ForecastRain>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastEntry>,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    #[instrument(name = "OpenWeatherFetch", skip(self))]
    async fn fetch_weather(&self, location: &str) -> Result<WeatherSnapshot, FetchError> {
        let point = self.geocode(location).await?;

        let today = Utc::now().date_naive();
        let start = today - Days::new(HISTORY_DAYS);
        let end = today - Days::new(1);

        let (current, forecast, history) = tokio::try_join!(
            self.current(&point),
            self.forecast(&point),
            self.history
                .fetch_history(point.lat, point.lon, start, end, self.units),
        )?;

        Ok(WeatherSnapshot {
            location: point.name,
            units: self.units,
            current,
            history,
            forecast,
        })
    }
}
