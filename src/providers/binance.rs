use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, instrument};

use crate::core::error::FetchError;
use crate::core::quote::{AssetClass, PricePoint, Quote, QuoteProvider};
use crate::providers::yahoo_finance::HISTORY_POINTS;

/// Binance error code for an unknown trading pair.
const INVALID_SYMBOL: i64 = -1121;

/// Crypto quotes from the Binance public REST API.
pub struct BinanceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceProvider {
    pub fn new(base_url: &str, client: reqwest::Client) -> Self {
        BinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn get(&self, url: &str, symbol: &str) -> Result<Value, FetchError> {
        debug!("Requesting {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::network(symbol, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FetchError::network(symbol, e))?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<BinanceError>(&text)
                && err.code == INVALID_SYMBOL
            {
                return Err(FetchError::NotFound(symbol.to_string()));
            }
            return Err(FetchError::Http {
                target: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        serde_json::from_str(&text).map_err(|e| FetchError::malformed(symbol, e))
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Decimal, FetchError> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol);
        let ticker: TickerPrice = serde_json::from_value(self.get(&url, symbol).await?)
            .map_err(|e| FetchError::malformed(symbol, e))?;
        Decimal::from_str(&ticker.price).map_err(|e| FetchError::malformed(symbol, e))
    }

    async fn fetch_history(&self, symbol: &str) -> Result<Vec<PricePoint>, FetchError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval=1m&limit={}",
            self.base_url, symbol, HISTORY_POINTS
        );
        let klines = self.get(&url, symbol).await?;
        parse_klines(&klines).ok_or_else(|| FetchError::malformed(symbol, "unexpected kline layout"))
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i64,
}

/// Klines are positional arrays; index 4 is the close price (a string) and
/// index 6 the close time in milliseconds.
fn parse_klines(value: &Value) -> Option<Vec<PricePoint>> {
    value
        .as_array()?
        .iter()
        .map(|kline| {
            let close = Decimal::from_str(kline.get(4)?.as_str()?).ok()?;
            let close_time: DateTime<Utc> =
                Utc.timestamp_millis_opt(kline.get(6)?.as_i64()?).single()?;
            Some(PricePoint {
                timestamp: close_time,
                price: close,
            })
        })
        .collect()
}

#[async_trait]
impl QuoteProvider for BinanceProvider {
    #[instrument(
        name = "BinanceQuoteFetch",
        skip(self),
        fields(symbol = %symbol)
    )]
    async fn fetch_quote(
        &self,
        symbol: &str,
        asset_class: AssetClass,
    ) -> Result<Quote, FetchError> {
        let symbol = symbol.to_uppercase();
        let (price, recent_history) =
            tokio::try_join!(self.fetch_price(&symbol), self.fetch_history(&symbol))?;

        // The last kline is still open, so its close time can sit in the
        // future; never stamp a quote later than now.
        let now = Utc::now();
        let timestamp = recent_history
            .last()
            .map(|p| p.timestamp.min(now))
            .unwrap_or(now);

        debug!(%price, points = recent_history.len(), "Received Binance quote");
        Ok(Quote {
            symbol,
            asset_class,
            price,
            timestamp,
            recent_history,
        })
    }
}
