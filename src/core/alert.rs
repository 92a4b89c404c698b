//! Price alert rules, their evaluation against fresh quotes, and the JSON
//! file that backs them.
use crate::core::error::ConfigError;
use crate::core::quote::Quote;
use anyhow::{Context, Result, anyhow, bail};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    /// Whether `price` has crossed `threshold` in this direction. Touching the
    /// threshold counts as crossing.
    pub fn is_crossed(&self, price: Decimal, threshold: Decimal) -> bool {
        match self {
            Direction::Above => price >= threshold,
            Direction::Below => price <= threshold,
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Above => write!(f, "above"),
            Direction::Below => write!(f, "below"),
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "above" => Ok(Direction::Above),
            "below" => Ok(Direction::Below),
            _ => Err(anyhow!("Invalid direction: {} (expected above or below)", s)),
        }
    }
}

fn default_armed() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub threshold: Decimal,
    pub direction: Direction,
    #[serde(default = "default_armed")]
    pub armed: bool,
}

impl AlertRule {
    pub fn new(symbol: &str, threshold: Decimal, direction: Direction) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            threshold,
            direction,
            armed: true,
        }
    }

    fn validate(mut self) -> Result<Self, String> {
        self.symbol = self.symbol.trim().to_uppercase();
        if self.symbol.is_empty() {
            return Err("symbol is empty".to_string());
        }
        if self.threshold <= Decimal::ZERO {
            return Err(format!("threshold {} must be positive", self.threshold));
        }
        Ok(self)
    }
}

/// A rule that fired during evaluation, with the price that crossed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggeredAlert {
    pub id: String,
    pub rule: AlertRule,
    pub price: Decimal,
}

impl TriggeredAlert {
    pub fn message(&self) -> String {
        format!(
            "{} crossed {} {:.2} (now {:.2})",
            self.rule.symbol, self.rule.direction, self.rule.threshold, self.price
        )
    }
}

/// The set of alert rules, keyed by rule id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertBook {
    rules: BTreeMap<String, AlertRule>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, rule: AlertRule) -> Result<()> {
        if self.rules.contains_key(id) {
            bail!("Alert rule '{}' already exists", id);
        }
        let rule = rule
            .validate()
            .map_err(|reason| anyhow!("Invalid alert rule '{}': {}", id, reason))?;
        self.rules.insert(id.to_string(), rule);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<AlertRule> {
        self.rules.remove(id)
    }

    /// Makes a triggered rule eligible to fire again.
    pub fn rearm(&mut self, id: &str) -> Result<()> {
        let rule = self
            .rules
            .get_mut(id)
            .ok_or_else(|| anyhow!("Alert rule '{}' not found", id))?;
        rule.armed = true;
        Ok(())
    }

    /// Marks a rule as fired. Returns false when no rule has that id.
    pub fn disarm(&mut self, id: &str) -> bool {
        match self.rules.get_mut(id) {
            Some(rule) => {
                rule.armed = false;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&AlertRule> {
        self.rules.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AlertRule)> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Symbols referenced by rules that can still fire.
    pub fn armed_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .rules
            .values()
            .filter(|r| r.armed)
            .map(|r| r.symbol.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }
}

/// Fires every armed rule whose symbol has a quote that crossed the rule's
/// threshold, and disarms it. Rules without a quote are left untouched.
pub fn evaluate(book: &mut AlertBook, quotes: &HashMap<String, Quote>) -> Vec<TriggeredAlert> {
    let mut triggered = Vec::new();

    for (id, rule) in book.rules.iter_mut() {
        if !rule.armed {
            continue;
        }
        let Some(quote) = quotes.get(&rule.symbol) else {
            debug!("No quote for {} (rule {}), skipping", rule.symbol, id);
            continue;
        };
        if rule.direction.is_crossed(quote.price, rule.threshold) {
            rule.armed = false;
            info!(
                rule = %id,
                symbol = %rule.symbol,
                price = %quote.price,
                threshold = %rule.threshold,
                "Alert triggered"
            );
            triggered.push(TriggeredAlert {
                id: id.clone(),
                rule: rule.clone(),
                price: quote.price,
            });
        }
    }

    triggered
}

/// Reads and rewrites the flat JSON alert file.
#[derive(Debug, Clone)]
pub struct AlertStore {
    path: PathBuf,
}

impl AlertStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the rule book. Entries that fail to parse or validate are skipped
    /// and returned as warnings; a missing file is an empty book.
    pub fn load(&self) -> Result<(AlertBook, Vec<ConfigError>)> {
        if !self.path.exists() {
            debug!("No alert file at {}, starting empty", self.path.display());
            return Ok((AlertBook::new(), Vec::new()));
        }

        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read alert file: {}", self.path.display()))?;
        if text.trim().is_empty() {
            return Ok((AlertBook::new(), Vec::new()));
        }

        let entries: BTreeMap<String, serde_json::Value> = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse alert file: {}", self.path.display()))?;

        let mut book = AlertBook::new();
        let mut warnings = Vec::new();

        for (id, value) in entries {
            let parsed = serde_json::from_value::<AlertRule>(value)
                .map_err(|e| e.to_string())
                .and_then(AlertRule::validate);
            match parsed {
                Ok(rule) => {
                    book.rules.insert(id, rule);
                }
                Err(reason) => {
                    let err = ConfigError::InvalidAlertRule { id, reason };
                    warn!("{}", err);
                    warnings.push(err);
                }
            }
        }

        debug!("Loaded {} alert rules", book.len());
        Ok((book, warnings))
    }

    /// Rewrites the whole file through a temporary sibling and a rename.
    pub fn save(&self, book: &AlertBook) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&book.rules)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write alert file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace alert file: {}", self.path.display()))?;

        debug!("Saved {} alert rules to {}", book.len(), self.path.display());
        Ok(())
    }

    /// Re-reads the file, disarms `ids` in it and writes it back. Rules added,
    /// removed or re-armed by another writer since the last load are kept.
    /// Ids no longer in the file are ignored. Returns the book as saved.
    pub fn disarm<'a, I>(&self, ids: I) -> Result<AlertBook>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let (mut book, _) = self.load()?;
        for id in ids {
            if !book.disarm(id) {
                debug!("Fired rule {} is no longer in the alert file", id);
            }
        }
        self.save(&book)?;
        Ok(book)
    }
}
