use crate::core::error::ConfigError;
use crate::core::portfolio::PortfolioPosition;
use crate::core::weather::Units;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::{debug, warn};

const DEFAULT_REFRESH_SECS: u64 = 30;
const MIN_REFRESH_SECS: u64 = 5;
const MAX_REFRESH_SECS: u64 = 3600;
const DEFAULT_CITIES: &str = "Toronto,CA;Lagos,NG;London,GB";

fn default_refresh_secs() -> u64 {
    DEFAULT_REFRESH_SECS
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    pub retries: usize,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            retries: 1,
            delay_ms: 500,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct QuotesConfig {
    #[serde(default)]
    pub equities: Vec<String>,
    #[serde(default)]
    pub crypto: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct WeatherConfig {
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub units: Units,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct FootballConfig {
    #[serde(default)]
    pub competitions: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
}

impl ProviderConfig {
    fn new(base_url: &str) -> Option<Self> {
        Some(ProviderConfig {
            base_url: base_url.to_string(),
        })
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<ProviderConfig>,
    pub binance: Option<ProviderConfig>,
    pub openweather: Option<ProviderConfig>,
    pub open_meteo: Option<ProviderConfig>,
    pub football_data: Option<ProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: ProviderConfig::new("https://query1.finance.yahoo.com"),
            binance: ProviderConfig::new("https://api.binance.com"),
            openweather: ProviderConfig::new("https://api.openweathermap.org"),
            open_meteo: ProviderConfig::new("https://archive-api.open-meteo.com"),
            football_data: ProviderConfig::new("https://api.football-data.org"),
        }
    }
}

impl ProvidersConfig {
    pub fn yahoo_url(&self) -> &str {
        self.yahoo
            .as_ref()
            .map_or("https://query1.finance.yahoo.com", |p| &p.base_url)
    }

    pub fn binance_url(&self) -> &str {
        self.binance
            .as_ref()
            .map_or("https://api.binance.com", |p| &p.base_url)
    }

    pub fn openweather_url(&self) -> &str {
        self.openweather
            .as_ref()
            .map_or("https://api.openweathermap.org", |p| &p.base_url)
    }

    pub fn open_meteo_url(&self) -> &str {
        self.open_meteo
            .as_ref()
            .map_or("https://archive-api.open-meteo.com", |p| &p.base_url)
    }

    pub fn football_data_url(&self) -> &str {
        self.football_data
            .as_ref()
            .map_or("https://api.football-data.org", |p| &p.base_url)
    }
}

/// Credentials and defaults read from the process environment.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub owm_api_key: Option<String>,
    pub football_data_token: Option<String>,
    pub default_cities: Option<String>,
}

impl Environment {
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Environment {
            owm_api_key: non_empty("OWM_API_KEY"),
            football_data_token: non_empty("FOOTBALL_DATA_TOKEN"),
            default_cities: non_empty("DEFAULT_CITIES"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_refresh_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub quotes: QuotesConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub football: FootballConfig,
    #[serde(default)]
    portfolio: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub alerts_path: Option<String>,

    /// Validated holdings, filled from `portfolio` when the config is loaded.
    #[serde(skip)]
    pub positions: Vec<PortfolioPosition>,
    /// Entries rejected while loading.
    #[serde(skip)]
    pub warnings: Vec<ConfigError>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "pulseboard", "pulseboard")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn alerts_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.alerts_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(Self::project_dirs()?.data_dir().join("alerts.json"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config = Self::from_yaml_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Parses the YAML and validates the portfolio entry by entry. Invalid
    /// holdings are skipped and recorded in `warnings`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(yaml)?;

        for (index, value) in config.portfolio.iter().enumerate() {
            let parsed = serde_yaml::from_value::<PortfolioPosition>(value.clone())
                .map_err(|e| ConfigError::InvalidPosition {
                    index,
                    reason: e.to_string(),
                })
                .and_then(|p| p.validate(index));
            match parsed {
                Ok(position) => config.positions.push(position),
                Err(err) => {
                    warn!("{}", err);
                    config.warnings.push(err);
                }
            }
        }

        normalise(&mut config.quotes.equities, str::to_uppercase);
        normalise(&mut config.quotes.crypto, str::to_uppercase);
        normalise(&mut config.football.competitions, str::to_uppercase);
        normalise(&mut config.weather.locations, str::to_string);
        Ok(config)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(
            self.refresh_interval_secs
                .clamp(MIN_REFRESH_SECS, MAX_REFRESH_SECS),
        )
    }

    /// Configured locations, or the `DEFAULT_CITIES` list when none are set.
    pub fn weather_locations(&self, env: &Environment) -> Vec<String> {
        if !self.weather.locations.is_empty() {
            return self.weather.locations.clone();
        }
        let mut cities: Vec<String> = env
            .default_cities
            .as_deref()
            .unwrap_or(DEFAULT_CITIES)
            .split(';')
            .map(String::from)
            .collect();
        normalise(&mut cities, str::to_string);
        cities
    }
}

/// Trims and rewrites each entry with `canonical`, then drops empties and
/// repeats. Tiles are keyed by these strings, so each must be unique.
fn normalise(entries: &mut Vec<String>, canonical: fn(&str) -> String) {
    for entry in entries.iter_mut() {
        *entry = canonical(entry.trim());
    }
    entries.retain(|e| !e.is_empty());
    let mut seen = std::collections::HashSet::new();
    entries.retain(|e| seen.insert(e.clone()));
}
