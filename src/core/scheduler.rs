//! The refresh loop that drives every tile.
//!
//! One cycle walks `Idle -> Fetching -> Rendering -> Idle`. All fetches of a
//! cycle fan out concurrently and are joined at a single barrier; only then
//! are quotes merged, alerts evaluated, the portfolio valued, and the
//! resulting [`DashboardSnapshot`] published and rendered. A tick that finds
//! the scheduler anywhere but `Idle` is dropped, so at most one cycle is ever
//! in flight.
//!
//! The alert file is re-read before each cycle's fetches, and a trigger only
//! ever flips the fired rules in it, so rules edited from another process
//! while the loop runs are kept.

use crate::core::alert::{self, AlertBook, AlertStore, TriggeredAlert};
use crate::core::error::FetchError;
use crate::core::football::{CompetitionSnapshot, FootballProvider};
use crate::core::portfolio::{self, PortfolioPosition, PortfolioReport};
use crate::core::quote::{AssetClass, Quote, QuoteProvider};
use crate::core::weather::{self, WeatherProvider, WeatherSnapshot};
use crate::providers::util::{RetryPolicy, with_retry};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CycleState {
    Idle = 0,
    Fetching = 1,
    Rendering = 2,
}

impl CycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CycleState::Fetching,
            2 => CycleState::Rendering,
            _ => CycleState::Idle,
        }
    }
}

/// What a tile shows after a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Tile<T> {
    Fresh(T),
    /// The fetch failed this cycle; `last_good` is the most recent value
    /// from an earlier cycle, if there ever was one.
    Failed {
        error: FetchError,
        last_good: Option<T>,
    },
}

impl<T> Tile<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Tile::Fresh(value) => Some(value),
            Tile::Failed { last_good, .. } => last_good.as_ref(),
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            Tile::Fresh(_) => None,
            Tile::Failed { error, .. } => Some(error),
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Tile::Fresh(_))
    }
}

/// Everything one completed cycle produced. Published as an immutable
/// `Arc` so readers always see a consistent view.
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub cycle: u64,
    pub completed_at: DateTime<Utc>,
    pub quotes: Vec<(String, Tile<Quote>)>,
    pub weather: Vec<(String, Tile<WeatherSnapshot>)>,
    pub football: Vec<(String, Tile<CompetitionSnapshot>)>,
    pub triggered: Vec<TriggeredAlert>,
    pub portfolio: PortfolioReport,
    pub warnings: Vec<String>,
}

pub trait Renderer: Send + Sync {
    fn render(&self, snapshot: &DashboardSnapshot);
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    Completed(Arc<DashboardSnapshot>),
    /// Another cycle was still in flight.
    Dropped,
}

/// The symbols, locations and competitions shown as tiles.
#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    pub quotes: Vec<(String, AssetClass)>,
    pub locations: Vec<String>,
    pub competitions: Vec<String>,
}

/// Process-wide state, built once at startup and owned by the scheduler.
pub struct SchedulerContext {
    pub interval: Duration,
    pub retry: RetryPolicy,
    pub watchlist: Watchlist,
    pub positions: Vec<PortfolioPosition>,
    pub quotes: Arc<dyn QuoteProvider>,
    pub weather: Option<Arc<dyn WeatherProvider>>,
    pub football: Option<Arc<dyn FootballProvider>>,
    pub alerts: AlertBook,
    pub alert_store: Option<AlertStore>,
    pub warnings: Vec<String>,
}

#[derive(Default)]
struct LastGood {
    quotes: HashMap<String, Quote>,
    weather: HashMap<String, WeatherSnapshot>,
    football: HashMap<String, CompetitionSnapshot>,
}

/// The in-memory rule book plus the ids that fired but are not yet marked
/// disarmed in the alert file.
#[derive(Default)]
struct AlertState {
    book: AlertBook,
    unsaved: BTreeSet<String>,
}

struct CycleResults {
    quotes: Vec<(String, Result<Quote, FetchError>)>,
    weather: Vec<(String, Result<WeatherSnapshot, FetchError>)>,
    football: Vec<(String, Result<CompetitionSnapshot, FetchError>)>,
}

/// Returns the state to `Idle` when a cycle ends, even by panic.
struct IdleOnDrop<'a>(&'a AtomicU8);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(CycleState::Idle as u8, Ordering::Release);
    }
}

pub struct RefreshScheduler {
    interval: Duration,
    retry: RetryPolicy,
    watchlist: Watchlist,
    positions: Vec<PortfolioPosition>,
    quote_provider: Arc<dyn QuoteProvider>,
    weather_provider: Option<Arc<dyn WeatherProvider>>,
    football_provider: Option<Arc<dyn FootballProvider>>,
    alert_store: Option<AlertStore>,
    warnings: Vec<String>,

    state: AtomicU8,
    cycles: AtomicU64,
    alerts: Mutex<AlertState>,
    last_good: Mutex<LastGood>,
    latest: RwLock<Option<Arc<DashboardSnapshot>>>,
}

impl RefreshScheduler {
    pub fn new(ctx: SchedulerContext) -> Self {
        info!(
            interval_secs = ctx.interval.as_secs(),
            quotes = ctx.watchlist.quotes.len(),
            locations = ctx.watchlist.locations.len(),
            competitions = ctx.watchlist.competitions.len(),
            rules = ctx.alerts.len(),
            "Scheduler initialised"
        );
        RefreshScheduler {
            interval: ctx.interval,
            retry: ctx.retry,
            watchlist: ctx.watchlist,
            positions: ctx.positions,
            quote_provider: ctx.quotes,
            weather_provider: ctx.weather,
            football_provider: ctx.football,
            alert_store: ctx.alert_store,
            warnings: ctx.warnings,
            state: AtomicU8::new(CycleState::Idle as u8),
            cycles: AtomicU64::new(0),
            alerts: Mutex::new(AlertState {
                book: ctx.alerts,
                unsaved: BTreeSet::new(),
            }),
            last_good: Mutex::new(LastGood::default()),
            latest: RwLock::new(None),
        }
    }

    pub fn state(&self) -> CycleState {
        CycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The snapshot of the last completed cycle.
    pub async fn latest(&self) -> Option<Arc<DashboardSnapshot>> {
        self.latest.read().await.clone()
    }

    /// A copy of the current alert rules, including their armed flags.
    pub async fn alerts(&self) -> AlertBook {
        self.alerts.lock().await.book.clone()
    }

    /// Picks up rules added, removed or re-armed in the alert file since the
    /// last cycle. On a read or write failure the in-memory book is kept.
    async fn sync_alerts(&self) {
        let Some(store) = &self.alert_store else {
            return;
        };
        let mut state = self.alerts.lock().await;
        if !state.unsaved.is_empty() {
            if let Err(e) = self.flush_alerts(&mut state) {
                warn!("Failed to persist triggered alerts: {e:#}");
            }
            return;
        }
        match store.load() {
            Ok((book, _)) => state.book = book,
            Err(e) => warn!("Failed to reload alert file, keeping current rules: {e:#}"),
        }
    }

    /// Writes pending disarms into the alert file without touching other
    /// rules, then adopts the file's book.
    fn flush_alerts(&self, state: &mut AlertState) -> Result<()> {
        if state.unsaved.is_empty() {
            return Ok(());
        }
        if let Some(store) = &self.alert_store {
            state.book = store.disarm(&state.unsaved)?;
            debug!(
                "Disarmed {} fired rules in {}",
                state.unsaved.len(),
                store.path().display()
            );
        }
        state.unsaved.clear();
        Ok(())
    }

    /// Every symbol that needs a quote this cycle: the watchlist first, then
    /// portfolio holdings and armed alert rules not already on it.
    async fn quote_targets(&self) -> Vec<(String, AssetClass)> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        let mut push = |symbol: &str, class: AssetClass| {
            if seen.insert(symbol.to_string()) {
                targets.push((symbol.to_string(), class));
            }
        };

        for (symbol, class) in &self.watchlist.quotes {
            push(symbol, *class);
        }
        for position in &self.positions {
            push(&position.symbol, position.asset_class());
        }
        for symbol in self.alerts.lock().await.book.armed_symbols() {
            push(&symbol, AssetClass::infer(&symbol));
        }
        targets
    }

    async fn fetch_all(&self) -> CycleResults {
        self.sync_alerts().await;
        let targets = self.quote_targets().await;
        let retry = self.retry;

        let quote_futures = targets.into_iter().map(|(symbol, class)| {
            let provider = Arc::clone(&self.quote_provider);
            async move {
                let result = with_retry(|| provider.fetch_quote(&symbol, class), retry).await;
                (symbol, result)
            }
        });

        let weather_future = async {
            let Some(provider) = &self.weather_provider else {
                return Vec::new();
            };
            let mut results =
                weather::fetch_locations(provider.as_ref(), &self.watchlist.locations, retry)
                    .await;
            self.watchlist
                .locations
                .iter()
                .filter_map(|location| {
                    results
                        .remove(location)
                        .map(|result| (location.clone(), result))
                })
                .collect()
        };

        let football_future = async {
            let Some(provider) = &self.football_provider else {
                return Vec::new();
            };
            let futures = self.watchlist.competitions.iter().map(|code| async move {
                let result = with_retry(|| provider.fetch_competition(code), retry).await;
                (code.clone(), result)
            });
            join_all(futures).await
        };

        let (quotes, weather, football) =
            futures::join!(join_all(quote_futures), weather_future, football_future);

        CycleResults {
            quotes,
            weather,
            football,
        }
    }

    /// Runs one cycle, or returns `Dropped` if a cycle is already running.
    pub async fn tick(&self, renderer: &dyn Renderer) -> TickOutcome {
        if self
            .state
            .compare_exchange(
                CycleState::Idle as u8,
                CycleState::Fetching as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!(state = ?self.state(), "Tick dropped, cycle still in flight");
            return TickOutcome::Dropped;
        }
        let _idle = IdleOnDrop(&self.state);

        let cycle = self.cycles.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(cycle, "Cycle state: fetching");
        let results = self.fetch_all().await;

        self.state
            .store(CycleState::Rendering as u8, Ordering::Release);
        debug!(cycle, "Cycle state: rendering");
        let snapshot = Arc::new(self.merge(cycle, results).await);

        *self.latest.write().await = Some(Arc::clone(&snapshot));
        renderer.render(&snapshot);
        debug!(cycle, "Cycle state: idle");

        TickOutcome::Completed(snapshot)
    }

    async fn merge(&self, cycle: u64, results: CycleResults) -> DashboardSnapshot {
        let mut last_good = self.last_good.lock().await;
        let mut fresh_quotes: HashMap<String, Quote> = HashMap::new();
        let mut quote_tiles = HashMap::new();

        for (symbol, result) in results.quotes {
            let tile = match result {
                Ok(quote) => {
                    let quote = match last_good.quotes.get(&symbol) {
                        Some(previous) if quote.timestamp < previous.timestamp => {
                            debug!(
                                %symbol,
                                "Ignoring quote older than the one already shown"
                            );
                            previous.clone()
                        }
                        _ => {
                            last_good.quotes.insert(symbol.clone(), quote.clone());
                            quote
                        }
                    };
                    fresh_quotes.insert(symbol.clone(), quote.clone());
                    Tile::Fresh(quote)
                }
                Err(error) => {
                    warn!(%symbol, %error, "Quote fetch failed");
                    Tile::Failed {
                        error,
                        last_good: last_good.quotes.get(&symbol).cloned(),
                    }
                }
            };
            quote_tiles.insert(symbol, tile);
        }

        let quotes = self
            .watchlist
            .quotes
            .iter()
            .filter_map(|(symbol, _)| {
                quote_tiles
                    .remove(symbol)
                    .map(|tile| (symbol.clone(), tile))
            })
            .collect();

        let weather = results
            .weather
            .into_iter()
            .map(|(location, result)| {
                let tile = match result {
                    Ok(snapshot) => {
                        last_good
                            .weather
                            .insert(location.clone(), snapshot.clone());
                        Tile::Fresh(snapshot)
                    }
                    Err(error) => {
                        warn!(%location, %error, "Weather fetch failed");
                        Tile::Failed {
                            error,
                            last_good: last_good.weather.get(&location).cloned(),
                        }
                    }
                };
                (location, tile)
            })
            .collect();

        let football = results
            .football
            .into_iter()
            .map(|(code, result)| {
                let tile = match result {
                    Ok(snapshot) => {
                        last_good.football.insert(code.clone(), snapshot.clone());
                        Tile::Fresh(snapshot)
                    }
                    Err(error) => {
                        warn!(%code, %error, "Football fetch failed");
                        Tile::Failed {
                            error,
                            last_good: last_good.football.get(&code).cloned(),
                        }
                    }
                };
                (code, tile)
            })
            .collect();
        drop(last_good);

        let triggered = {
            let mut state = self.alerts.lock().await;
            let triggered = alert::evaluate(&mut state.book, &fresh_quotes);
            state
                .unsaved
                .extend(triggered.iter().map(|t| t.id.clone()));
            if let Err(e) = self.flush_alerts(&mut state) {
                warn!("Failed to persist triggered alerts, retrying next cycle: {e:#}");
            }
            triggered
        };

        let portfolio = portfolio::compute(&self.positions, &fresh_quotes);

        DashboardSnapshot {
            cycle,
            completed_at: Utc::now(),
            quotes,
            weather,
            football,
            triggered,
            portfolio,
            warnings: self.warnings.clone(),
        }
    }

    /// Ticks on a fixed interval until `shutdown` resolves, then waits for
    /// any cycle still in flight and tears down.
    pub async fn run<F>(self: Arc<Self>, renderer: Arc<dyn Renderer>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    while let Some(joined) = in_flight.try_join_next() {
                        if let Err(e) = joined {
                            warn!("Refresh cycle aborted: {e}");
                        }
                    }
                    let scheduler = Arc::clone(&self);
                    let renderer = Arc::clone(&renderer);
                    in_flight.spawn(async move { scheduler.tick(renderer.as_ref()).await });
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                warn!("Refresh cycle aborted: {e}");
            }
        }
        self.teardown().await
    }

    /// Persists fired rules the last cycle could not write. Rules edited in
    /// the alert file during the session are left as they are.
    pub async fn teardown(&self) -> Result<()> {
        let mut state = self.alerts.lock().await;
        self.flush_alerts(&mut state)?;
        info!("Scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alert::{AlertRule, Direction};
    use crate::core::weather::{CurrentConditions, Units};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingRenderer {
        renders: AtomicUsize,
    }

    impl Renderer for RecordingRenderer {
        fn render(&self, _snapshot: &DashboardSnapshot) {
            self.renders.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Serves queued results per symbol; the last queued result repeats.
    #[derive(Default)]
    struct ScriptedQuotes {
        script: StdMutex<HashMap<String, Vec<Result<(i64, i64), FetchError>>>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedQuotes {
        fn with(entries: &[(&str, Vec<Result<(i64, i64), FetchError>>)]) -> Self {
            ScriptedQuotes {
                script: StdMutex::new(
                    entries
                        .iter()
                        .map(|(s, r)| (s.to_string(), r.clone()))
                        .collect(),
                ),
                gate: None,
            }
        }
    }

    #[async_trait]
    impl QuoteProvider for ScriptedQuotes {
        async fn fetch_quote(
            &self,
            symbol: &str,
            asset_class: AssetClass,
        ) -> Result<Quote, FetchError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let next = {
                let mut script = self.script.lock().unwrap();
                let queue = script
                    .get_mut(symbol)
                    .ok_or_else(|| FetchError::NotFound(symbol.to_string()))?;
                if queue.len() > 1 {
                    queue.remove(0)
                } else {
                    queue[0].clone()
                }
            };
            let (price, ts) = next?;
            Ok(Quote {
                symbol: symbol.to_string(),
                asset_class,
                price: Decimal::from(price),
                timestamp: DateTime::from_timestamp(ts, 0).unwrap(),
                recent_history: Vec::new(),
            })
        }
    }

    struct FlakyWeather;

    #[async_trait]
    impl WeatherProvider for FlakyWeather {
        async fn fetch_weather(&self, location: &str) -> Result<WeatherSnapshot, FetchError> {
            if location == "Atlantis,XX" {
                return Err(FetchError::NotFound(location.to_string()));
            }
            Ok(WeatherSnapshot {
                location: location.to_string(),
                units: Units::Metric,
                current: CurrentConditions {
                    temperature: 18.0,
                    feels_like: 17.0,
                    summary: "Clear".into(),
                    description: "clear sky".into(),
                    icon: None,
                },
                history: Vec::new(),
                forecast: Vec::new(),
            })
        }
    }

    fn context(quotes: Arc<dyn QuoteProvider>) -> SchedulerContext {
        SchedulerContext {
            interval: Duration::from_secs(5),
            retry: RetryPolicy::none(),
            watchlist: Watchlist::default(),
            positions: Vec::new(),
            quotes,
            weather: None,
            football: None,
            alerts: AlertBook::new(),
            alert_store: None,
            warnings: Vec::new(),
        }
    }

    fn completed(outcome: TickOutcome) -> Arc<DashboardSnapshot> {
        match outcome {
            TickOutcome::Completed(snapshot) => snapshot,
            TickOutcome::Dropped => panic!("Expected a completed cycle"),
        }
    }

    #[tokio::test]
    async fn test_one_failed_location_does_not_block_others() {
        let mut ctx = context(Arc::new(ScriptedQuotes::default()));
        ctx.weather = Some(Arc::new(FlakyWeather));
        ctx.watchlist.locations = vec![
            "Toronto,CA".to_string(),
            "Atlantis,XX".to_string(),
            "London,GB".to_string(),
        ];
        let scheduler = RefreshScheduler::new(ctx);
        let renderer = RecordingRenderer::default();

        let snapshot = completed(scheduler.tick(&renderer).await);

        let names: Vec<&str> = snapshot.weather.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(names, vec!["Toronto,CA", "Atlantis,XX", "London,GB"]);
        assert!(snapshot.weather[0].1.is_fresh());
        assert_eq!(
            snapshot.weather[1].1.error(),
            Some(&FetchError::NotFound("Atlantis,XX".into()))
        );
        assert!(snapshot.weather[2].1.is_fresh());
        assert_eq!(renderer.renders.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn test_tick_is_dropped_while_cycle_in_flight() {
        let gate = Arc::new(Notify::new());
        let mut provider = ScriptedQuotes::with(&[("AAPL", vec![Ok((180, 100))])]);
        provider.gate = Some(Arc::clone(&gate));

        let mut ctx = context(Arc::new(provider));
        ctx.watchlist.quotes = vec![("AAPL".to_string(), AssetClass::Equity)];
        let scheduler = Arc::new(RefreshScheduler::new(ctx));
        let renderer = Arc::new(RecordingRenderer::default());

        let first = {
            let scheduler = Arc::clone(&scheduler);
            let renderer = Arc::clone(&renderer);
            tokio::spawn(async move { scheduler.tick(renderer.as_ref()).await })
        };
        while scheduler.state() != CycleState::Fetching {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            scheduler.tick(renderer.as_ref()).await,
            TickOutcome::Dropped
        ));

        gate.notify_one();
        let snapshot = completed(first.await.unwrap());
        assert_eq!(snapshot.cycle, 1);
        assert_eq!(renderer.renders.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), CycleState::Idle);
        assert_eq!(scheduler.latest().await.unwrap().cycle, 1);
    }

    #[tokio::test]
    async fn test_alert_fires_once_and_is_persisted() {
        let dir = TempDir::new().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"));

        let mut book = AlertBook::new();
        book.insert(
            "btc",
            AlertRule::new("BTCUSDT", Decimal::from(50000), Direction::Above),
        )
        .unwrap();
        store.save(&book).unwrap();

        let mut ctx = context(Arc::new(ScriptedQuotes::with(&[(
            "BTCUSDT",
            vec![Ok((50500, 100))],
        )])));
        ctx.alerts = book;
        ctx.alert_store = Some(store.clone());
        let scheduler = RefreshScheduler::new(ctx);
        let renderer = RecordingRenderer::default();

        let first = completed(scheduler.tick(&renderer).await);
        assert_eq!(first.triggered.len(), 1);
        assert_eq!(first.triggered[0].id, "btc");
        assert_eq!(first.triggered[0].price, Decimal::from(50500));

        let (saved, _) = store.load().unwrap();
        assert!(!saved.get("btc").unwrap().armed);

        let second = completed(scheduler.tick(&renderer).await);
        assert!(second.triggered.is_empty());
        assert!(!scheduler.alerts().await.get("btc").unwrap().armed);
    }

    #[tokio::test]
    async fn test_failed_quote_keeps_last_good_value() {
        let provider = ScriptedQuotes::with(&[(
            "AAPL",
            vec![
                Ok((180, 100)),
                Err(FetchError::network("AAPL", "connection reset")),
            ],
        )]);
        let mut ctx = context(Arc::new(provider));
        ctx.watchlist.quotes = vec![("AAPL".to_string(), AssetClass::Equity)];
        ctx.positions = vec![PortfolioPosition::new(
            "AAPL",
            Decimal::from(10),
            Decimal::from(150),
        )];
        let scheduler = RefreshScheduler::new(ctx);
        let renderer = RecordingRenderer::default();

        let first = completed(scheduler.tick(&renderer).await);
        assert!(first.quotes[0].1.is_fresh());
        assert_eq!(first.portfolio.total_pl, Decimal::from(300));

        let second = completed(scheduler.tick(&renderer).await);
        let tile = &second.quotes[0].1;
        assert!(!tile.is_fresh());
        assert_eq!(tile.value().unwrap().price, Decimal::from(180));
        assert!(second.portfolio.positions[0].stale);
        assert_eq!(second.portfolio.total_value, Decimal::from(1500));
    }

    #[tokio::test]
    async fn test_older_quote_does_not_replace_newer() {
        let provider = ScriptedQuotes::with(&[("ETHUSDT", vec![Ok((3000, 200)), Ok((2900, 150))])]);
        let mut ctx = context(Arc::new(provider));
        ctx.watchlist.quotes = vec![("ETHUSDT".to_string(), AssetClass::Crypto)];
        let scheduler = RefreshScheduler::new(ctx);
        let renderer = RecordingRenderer::default();

        completed(scheduler.tick(&renderer).await);
        let second = completed(scheduler.tick(&renderer).await);
        let quote = second.quotes[0].1.value().unwrap();
        assert_eq!(quote.price, Decimal::from(3000));
        assert_eq!(quote.timestamp.timestamp(), 200);
    }

    #[tokio::test]
    async fn test_portfolio_and_alert_symbols_are_fetched() {
        let mut book = AlertBook::new();
        book.insert(
            "nvda",
            AlertRule::new("NVDA", Decimal::from(1000), Direction::Below),
        )
        .unwrap();

        let provider = ScriptedQuotes::with(&[
            ("AAPL", vec![Ok((180, 100))]),
            ("MSFT", vec![Ok((400, 100))]),
            ("NVDA", vec![Ok((900, 100))]),
        ]);
        let mut ctx = context(Arc::new(provider));
        ctx.watchlist.quotes = vec![("AAPL".to_string(), AssetClass::Equity)];
        ctx.positions = vec![PortfolioPosition::new(
            "MSFT",
            Decimal::ONE,
            Decimal::from(300),
        )];
        ctx.alerts = book;
        let scheduler = RefreshScheduler::new(ctx);

        let snapshot = completed(scheduler.tick(&RecordingRenderer::default()).await);
        assert_eq!(snapshot.quotes.len(), 1);
        assert_eq!(snapshot.portfolio.total_pl, Decimal::from(100));
        assert_eq!(snapshot.triggered.len(), 1);
        assert_eq!(snapshot.triggered[0].rule.symbol, "NVDA");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_shutdown_and_saves_alerts() {
        let dir = TempDir::new().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"));
        crate::cli::alerts::add(&store, "aapl", "AAPL", Decimal::from(150), Direction::Above)
            .unwrap();

        let mut ctx = context(Arc::new(ScriptedQuotes::with(&[(
            "AAPL",
            vec![Ok((180, 100))],
        )])));
        ctx.watchlist.quotes = vec![("AAPL".to_string(), AssetClass::Equity)];
        ctx.alerts = store.load().unwrap().0;
        ctx.alert_store = Some(store.clone());
        let scheduler = Arc::new(RefreshScheduler::new(ctx));
        let renderer = Arc::new(RecordingRenderer::default());

        let shutdown = tokio::time::sleep(Duration::from_secs(12));
        Arc::clone(&scheduler)
            .run(renderer.clone(), shutdown)
            .await
            .unwrap();

        assert_eq!(renderer.renders.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.latest().await.unwrap().cycle, 3);
        let (saved, _) = store.load().unwrap();
        assert!(!saved.get("aapl").unwrap().armed);
    }

    #[tokio::test]
    async fn test_rules_edited_during_session_survive_cycles_and_teardown() {
        let dir = TempDir::new().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"));
        crate::cli::alerts::add(&store, "a", "AAPL", Decimal::from(150), Direction::Above)
            .unwrap();

        let provider = ScriptedQuotes::with(&[
            ("AAPL", vec![Ok((180, 100))]),
            ("MSFT", vec![Ok((400, 100))]),
        ]);
        let mut ctx = context(Arc::new(provider));
        ctx.alerts = store.load().unwrap().0;
        ctx.alert_store = Some(store.clone());
        let scheduler = RefreshScheduler::new(ctx);
        let renderer = RecordingRenderer::default();

        crate::cli::alerts::add(&store, "b", "MSFT", Decimal::from(500), Direction::Above)
            .unwrap();
        let first = completed(scheduler.tick(&renderer).await);
        let fired: Vec<&str> = first.triggered.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(fired, vec!["a"]);

        let (saved, _) = store.load().unwrap();
        assert!(!saved.get("a").unwrap().armed);
        assert!(saved.get("b").unwrap().armed);

        crate::cli::alerts::rearm(&store, "a").unwrap();
        crate::cli::alerts::add(&store, "c", "MSFT", Decimal::from(300), Direction::Above)
            .unwrap();
        crate::cli::alerts::remove(&store, "b").unwrap();
        let second = completed(scheduler.tick(&renderer).await);
        let fired: Vec<&str> = second.triggered.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(fired, vec!["a", "c"]);

        crate::cli::alerts::add(&store, "d", "AAPL", Decimal::from(100), Direction::Below)
            .unwrap();
        scheduler.teardown().await.unwrap();

        let (saved, _) = store.load().unwrap();
        assert_eq!(saved.len(), 3);
        assert!(saved.get("b").is_none());
        assert!(!saved.get("a").unwrap().armed);
        assert!(!saved.get("c").unwrap().armed);
        assert!(saved.get("d").unwrap().armed);
    }
}
