//! Quote abstractions and core types

use crate::core::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

const CRYPTO_QUOTE_SUFFIXES: [&str; 5] = ["USDT", "BUSD", "USDC", "BTC", "ETH"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Equity,
    Crypto,
}

impl AssetClass {
    /// Guesses the asset class of a bare symbol from its quote-currency suffix.
    pub fn infer(symbol: &str) -> Self {
        let upper = symbol.to_uppercase();
        if CRYPTO_QUOTE_SUFFIXES
            .iter()
            .any(|suffix| upper.len() > suffix.len() && upper.ends_with(suffix))
        {
            AssetClass::Crypto
        } else {
            AssetClass::Equity
        }
    }
}

impl Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AssetClass::Equity => "equity",
                AssetClass::Crypto => "crypto",
            }
        )
    }
}

impl FromStr for AssetClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "equity" | "stock" => Ok(AssetClass::Equity),
            "crypto" => Ok(AssetClass::Crypto),
            _ => Err(anyhow::anyhow!("Invalid asset class: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

/// The latest price of a symbol plus a short trailing history for sparklines.
///
/// A quote is never mutated; the next fetch produces a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub recent_history: Vec<PricePoint>,
}

impl Quote {
    /// Percent change from the first point of the recent history to the current price.
    pub fn change_pct(&self) -> Option<Decimal> {
        let first = self.recent_history.first()?.price;
        self.price
            .checked_sub(first)?
            .checked_div(first)?
            .checked_mul(Decimal::ONE_HUNDRED)
    }
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_quote(&self, symbol: &str, asset_class: AssetClass)
    -> Result<Quote, FetchError>;
}

/// Routes a quote request to the provider responsible for its asset class.
pub struct MarketQuotes {
    equity: Arc<dyn QuoteProvider>,
    crypto: Arc<dyn QuoteProvider>,
}

impl MarketQuotes {
    pub fn new(equity: Arc<dyn QuoteProvider>, crypto: Arc<dyn QuoteProvider>) -> Self {
        Self { equity, crypto }
    }
}

#[async_trait]
impl QuoteProvider for MarketQuotes {
    async fn fetch_quote(
        &self,
        symbol: &str,
        asset_class: AssetClass,
    ) -> Result<Quote, FetchError> {
        match asset_class {
            AssetClass::Equity => self.equity.fetch_quote(symbol, asset_class).await,
            AssetClass::Crypto => self.crypto.fetch_quote(symbol, asset_class).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider(Decimal);

    #[async_trait]
    impl QuoteProvider for FixedProvider {
        async fn fetch_quote(
            &self,
            symbol: &str,
            asset_class: AssetClass,
        ) -> Result<Quote, FetchError> {
            Ok(Quote {
                symbol: symbol.to_string(),
                asset_class,
                price: self.0,
                timestamp: Utc::now(),
                recent_history: Vec::new(),
            })
        }
    }

    #[test]
    fn test_asset_class_inference() {
        assert_eq!(AssetClass::infer("BTCUSDT"), AssetClass::Crypto);
        assert_eq!(AssetClass::infer("ethusdt"), AssetClass::Crypto);
        assert_eq!(AssetClass::infer("ETHBTC"), AssetClass::Crypto);
        assert_eq!(AssetClass::infer("AAPL"), AssetClass::Equity);
        assert_eq!(AssetClass::infer("ETH"), AssetClass::Equity);
    }

    #[test]
    fn test_asset_class_from_str() {
        assert_eq!("Crypto".parse::<AssetClass>().unwrap(), AssetClass::Crypto);
        assert_eq!("stock".parse::<AssetClass>().unwrap(), AssetClass::Equity);
        assert!("bond".parse::<AssetClass>().is_err());
    }

    #[test]
    fn test_change_pct() {
        let now = Utc::now();
        let quote = Quote {
            symbol: "AAPL".into(),
            asset_class: AssetClass::Equity,
            price: Decimal::from(110),
            timestamp: now,
            recent_history: vec![
                PricePoint {
                    timestamp: now,
                    price: Decimal::from(100),
                },
                PricePoint {
                    timestamp: now,
                    price: Decimal::from(105),
                },
            ],
        };
        assert_eq!(quote.change_pct(), Some(Decimal::from(10)));

        let overflowing = Quote {
            price: Decimal::MAX,
            recent_history: vec![PricePoint {
                timestamp: now,
                price: Decimal::new(1, 6),
            }],
            ..quote.clone()
        };
        assert_eq!(overflowing.change_pct(), None);

        let from_zero = Quote {
            recent_history: vec![PricePoint {
                timestamp: now,
                price: Decimal::ZERO,
            }],
            ..quote.clone()
        };
        assert_eq!(from_zero.change_pct(), None);

        let no_history = Quote {
            recent_history: Vec::new(),
            ..quote
        };
        assert_eq!(no_history.change_pct(), None);
    }

    #[tokio::test]
    async fn test_market_quotes_routes_by_asset_class() {
        let router = MarketQuotes::new(
            Arc::new(FixedProvider(Decimal::from(180))),
            Arc::new(FixedProvider(Decimal::from(50500))),
        );

        let equity = router
            .fetch_quote("AAPL", AssetClass::Equity)
            .await
            .unwrap();
        assert_eq!(equity.price, Decimal::from(180));

        let crypto = router
            .fetch_quote("BTCUSDT", AssetClass::Crypto)
            .await
            .unwrap();
        assert_eq!(crypto.price, Decimal::from(50500));
        assert_eq!(crypto.asset_class, AssetClass::Crypto);
    }
}
