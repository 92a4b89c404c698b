//! Provides profit/loss and allocation calculations over the holdings table.
use crate::core::error::ConfigError;
use crate::core::quote::{AssetClass, Quote};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// A single user-entered holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPosition {
    pub symbol: String,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
}

impl PortfolioPosition {
    pub fn new(symbol: &str, quantity: Decimal, cost_basis: Decimal) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            quantity,
            cost_basis,
        }
    }

    pub fn asset_class(&self) -> AssetClass {
        AssetClass::infer(&self.symbol)
    }

    /// `None` when quantity times cost basis does not fit in a `Decimal`.
    pub fn total_cost(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.cost_basis)
    }

    /// Normalises the symbol and rejects entries that cannot be valued.
    pub fn validate(mut self, index: usize) -> Result<Self, ConfigError> {
        let reject = |reason: &str| ConfigError::InvalidPosition {
            index,
            reason: reason.to_string(),
        };
        self.symbol = self.symbol.trim().to_uppercase();
        if self.symbol.is_empty() {
            return Err(reject("symbol is empty"));
        }
        if self.quantity.is_sign_negative() {
            return Err(reject("quantity must not be negative"));
        }
        if self.cost_basis.is_sign_negative() {
            return Err(reject("cost_basis must not be negative"));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionValue {
    pub symbol: String,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub price: Option<Decimal>,
    pub current_value: Decimal,
    pub pl: Decimal,
    pub pl_pct: Decimal,
    /// No current price; `current_value` falls back to the position's cost.
    pub stale: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioReport {
    pub positions: Vec<PositionValue>,
    pub total_value: Decimal,
    pub total_cost: Decimal,
    pub total_pl: Decimal,
    pub total_pl_pct: Decimal,
    pub allocation: BTreeMap<String, Decimal>,
}

impl PortfolioReport {
    pub fn has_stale(&self) -> bool {
        self.positions.iter().any(|p| p.stale)
    }
}

fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

/// Values every position against the current quotes.
///
/// Positions without a quote are kept in the totals at cost and flagged
/// stale. A zero denominator yields a zero percentage instead of an error.
/// A position whose value overflows is flagged stale and valued at cost; one
/// whose cost overflows, or that would overflow the totals, is left out of
/// the totals.
pub fn compute(positions: &[PortfolioPosition], quotes: &HashMap<String, Quote>) -> PortfolioReport {
    let mut report = PortfolioReport::default();

    for position in positions {
        let price = quotes.get(&position.symbol).map(|q| q.price);
        let mut row = PositionValue {
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            cost_basis: position.cost_basis,
            price,
            current_value: Decimal::ZERO,
            pl: Decimal::ZERO,
            pl_pct: Decimal::ZERO,
            stale: true,
        };

        let Some(cost) = position.total_cost() else {
            warn!(symbol = %position.symbol, "Position cost overflows, excluded from totals");
            report.positions.push(row);
            continue;
        };

        let value = price.and_then(|p| position.quantity.checked_mul(p));
        if price.is_some() && value.is_none() {
            warn!(symbol = %position.symbol, "Position value overflows, valued at cost");
        }
        row.current_value = value.unwrap_or(cost);
        row.stale = value.is_none();
        row.pl = row.current_value.checked_sub(cost).unwrap_or(Decimal::ZERO);
        row.pl_pct = percent_of(row.pl, cost);

        let totals = report
            .total_value
            .checked_add(row.current_value)
            .zip(report.total_cost.checked_add(cost));
        match totals {
            Some((total_value, total_cost)) => {
                report.total_value = total_value;
                report.total_cost = total_cost;
                let share = report
                    .allocation
                    .entry(position.symbol.clone())
                    .or_insert(Decimal::ZERO);
                *share = share.saturating_add(row.current_value);
            }
            None => {
                warn!(symbol = %position.symbol, "Portfolio totals overflow, position excluded");
                row.stale = true;
            }
        }
        report.positions.push(row);
    }

    report.total_pl = report
        .total_value
        .checked_sub(report.total_cost)
        .unwrap_or(Decimal::ZERO);
    report.total_pl_pct = percent_of(report.total_pl, report.total_cost);

    let total_value = report.total_value;
    for share in report.allocation.values_mut() {
        *share = percent_of(*share, total_value);
    }

    report
}
