pub mod cli;
pub mod core;
pub mod providers;

pub use crate::core::config;

use crate::cli::dashboard::TerminalRenderer;
use crate::core::alert::{AlertStore, Direction};
use crate::core::config::{AppConfig, Environment};
use crate::core::football::FootballProvider;
use crate::core::quote::{AssetClass, MarketQuotes};
use crate::core::scheduler::{
    DashboardSnapshot, RefreshScheduler, Renderer, SchedulerContext, TickOutcome, Watchlist,
};
use crate::core::weather::WeatherProvider;
use crate::providers::util::{RetryPolicy, http_client};
use crate::providers::{
    binance::BinanceProvider, football_data::FootballDataProvider, open_meteo::OpenMeteoProvider,
    openweather::OpenWeatherProvider, yahoo_finance::YahooFinanceProvider,
};
use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    /// Refresh on an interval until interrupted.
    Watch { interval_secs: Option<u64> },
    /// Run a single refresh and print it.
    Once,
    Alerts(AlertCommand),
}

pub enum AlertCommand {
    List,
    Add {
        id: String,
        symbol: String,
        threshold: Decimal,
        direction: Direction,
    },
    Remove {
        id: String,
    },
    Rearm {
        id: String,
    },
}

fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

/// Wires providers, the alert book and the watchlist into the scheduler's
/// context. Weather and football are only built when their credentials are
/// present in `env`.
pub fn build_context(config: &AppConfig, env: &Environment) -> Result<SchedulerContext> {
    let client = http_client()?;
    let providers = &config.providers;

    let quotes = Arc::new(MarketQuotes::new(
        Arc::new(YahooFinanceProvider::new(
            providers.yahoo_url(),
            client.clone(),
        )),
        Arc::new(BinanceProvider::new(providers.binance_url(), client.clone())),
    ));

    let weather: Option<Arc<dyn WeatherProvider>> = match &env.owm_api_key {
        Some(key) => {
            let history = Arc::new(OpenMeteoProvider::new(
                providers.open_meteo_url(),
                client.clone(),
            ));
            Some(Arc::new(OpenWeatherProvider::new(
                providers.openweather_url(),
                key,
                config.weather.units,
                client.clone(),
                history,
            )))
        }
        None => {
            info!("OWM_API_KEY not set, weather tiles disabled");
            None
        }
    };

    let football: Option<Arc<dyn FootballProvider>> = match &env.football_data_token {
        Some(token) => Some(Arc::new(FootballDataProvider::new(
            providers.football_data_url(),
            token,
            client.clone(),
        ))),
        None => {
            info!("FOOTBALL_DATA_TOKEN not set, football tiles disabled");
            None
        }
    };

    let store = AlertStore::new(config.alerts_path()?);
    let (alerts, alert_warnings) = store.load()?;

    let mut watchlist = Watchlist {
        quotes: Vec::new(),
        locations: if weather.is_some() {
            config.weather_locations(env)
        } else {
            Vec::new()
        },
        competitions: if football.is_some() {
            config.football.competitions.clone()
        } else {
            Vec::new()
        },
    };
    watchlist.quotes.extend(
        config
            .quotes
            .equities
            .iter()
            .map(|s| (s.clone(), AssetClass::Equity)),
    );
    watchlist.quotes.extend(
        config
            .quotes
            .crypto
            .iter()
            .map(|s| (s.clone(), AssetClass::Crypto)),
    );

    let warnings = config
        .warnings
        .iter()
        .chain(alert_warnings.iter())
        .map(|w| w.to_string())
        .collect();

    Ok(SchedulerContext {
        interval: config.refresh_interval(),
        retry: RetryPolicy {
            retries: config.retry.retries,
            delay: Duration::from_millis(config.retry.delay_ms),
        },
        watchlist,
        positions: config.positions.clone(),
        quotes,
        weather,
        football,
        alerts,
        alert_store: Some(store),
        warnings,
    })
}

async fn watch(config: AppConfig, interval_secs: Option<u64>) -> Result<()> {
    let mut config = config;
    if let Some(secs) = interval_secs {
        config.refresh_interval_secs = secs;
    }
    let ctx = build_context(&config, &Environment::from_env())?;
    let scheduler = Arc::new(RefreshScheduler::new(ctx));
    let renderer = Arc::new(TerminalRenderer::new(true));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
        }
    };
    scheduler.run(renderer, shutdown).await
}

async fn once(config: AppConfig) -> Result<()> {
    let ctx = build_context(&config, &Environment::from_env())?;
    let scheduler = RefreshScheduler::new(ctx);

    let pb = crate::cli::ui::new_spinner("Refreshing...");
    // Printing happens after the spinner is cleared.
    let outcome = scheduler.tick(&NoopRenderer).await;
    pb.finish_and_clear();

    if let TickOutcome::Completed(snapshot) = outcome {
        println!("{}", crate::cli::dashboard::render_dashboard(&snapshot));
    }
    scheduler.teardown().await
}

struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn render(&self, _snapshot: &DashboardSnapshot) {}
}

fn alerts(config: AppConfig, command: AlertCommand) -> Result<()> {
    let store = AlertStore::new(config.alerts_path()?);
    match command {
        AlertCommand::List => println!("{}", crate::cli::alerts::list(&store)?),
        AlertCommand::Add {
            id,
            symbol,
            threshold,
            direction,
        } => crate::cli::alerts::add(&store, &id, &symbol, threshold, direction)?,
        AlertCommand::Remove { id } => crate::cli::alerts::remove(&store, &id)?,
        AlertCommand::Rearm { id } => crate::cli::alerts::rearm(&store, &id)?,
    }
    Ok(())
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Pulseboard starting...");
    let config = load_config(config_path)?;

    match command {
        AppCommand::Watch { interval_secs } => watch(config, interval_secs).await,
        AppCommand::Once => once(config).await,
        AppCommand::Alerts(cmd) => alerts(config, cmd),
    }
}
