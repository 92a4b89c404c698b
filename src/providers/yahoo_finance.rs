use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::error::FetchError;
use crate::core::quote::{AssetClass, PricePoint, Quote, QuoteProvider};
use crate::providers::util::get_json;

/// Number of intraday closes kept for the sparkline.
pub const HISTORY_POINTS: usize = 60;

fn to_decimal(value: f64, symbol: &str) -> Result<Decimal, FetchError> {
    Decimal::from_f64(value)
        .ok_or_else(|| FetchError::malformed(symbol, format!("price {value} is not representable")))
}

fn to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

/// Pairs chart timestamps with their closes, dropping the null bars Yahoo
/// emits for minutes without trades, and keeps the most recent points.
fn extract_recent_history(chart_item: &PriceChartItem, symbol: &str) -> Vec<PricePoint> {
    let (Some(timestamps), Some(closes)) = (
        chart_item.timestamp.as_ref(),
        chart_item
            .indicators
            .as_ref()
            .and_then(|inds| inds.quote.first())
            .and_then(|q| q.close.as_ref()),
    ) else {
        return Vec::new();
    };

    let mut points: Vec<PricePoint> = timestamps
        .iter()
        .zip(closes.iter())
        .filter_map(|(ts, close)| {
            let price = to_decimal((*close)?, symbol).ok()?;
            Some(PricePoint {
                timestamp: to_datetime(*ts)?,
                price,
            })
        })
        .collect();

    if points.len() > HISTORY_POINTS {
        points.drain(..points.len() - HISTORY_POINTS);
    }
    points
}

/// Equity quotes from the Yahoo Finance chart API.
pub struct YahooFinanceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str, client: reqwest::Client) -> Self {
        YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[derive(Deserialize, Debug)]
struct YahooPriceResponse {
    chart: PriceChartResult,
}

#[derive(Deserialize, Debug)]
struct PriceChartResult {
    result: Option<Vec<PriceChartItem>>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<ChartQuote>,
}

#[derive(Deserialize, Debug)]
struct ChartQuote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct PriceChartItem {
    meta: PriceChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct PriceChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: f64,
    #[serde(alias = "regularMarketTime")]
    regular_market_time: Option<i64>,
}

#[async_trait]
impl QuoteProvider for YahooFinanceProvider {
    #[instrument(
        name = "YahooQuoteFetch",
        skip(self),
        fields(symbol = %symbol)
    )]
    async fn fetch_quote(
        &self,
        symbol: &str,
        asset_class: AssetClass,
    ) -> Result<Quote, FetchError> {
        let symbol = symbol.to_uppercase();
        let url = format!(
            "{}/v8/finance/chart/{}?interval=5m&range=1d",
            self.base_url, symbol
        );
        debug!("Requesting quote data from {}", url);

        let data: YahooPriceResponse = get_json(self.client.get(&url), &symbol).await?;
        let item = data
            .chart
            .result
            .and_then(|items| items.into_iter().next())
            .ok_or_else(|| FetchError::NotFound(symbol.clone()))?;

        let price = to_decimal(item.meta.regular_market_price, &symbol)?;
        let recent_history = extract_recent_history(&item, &symbol);
        let timestamp = item
            .meta
            .regular_market_time
            .and_then(to_datetime)
            .or_else(|| recent_history.last().map(|p| p.timestamp))
            .unwrap_or_else(Utc::now);

        debug!(%price, points = recent_history.len(), "Received Yahoo quote");
        Ok(Quote {
            symbol,
            asset_class,
            price,
            timestamp,
            recent_history,
        })
    }
}
