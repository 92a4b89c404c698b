use super::ui;
use crate::core::alert::{AlertRule, AlertStore, Direction};
use anyhow::{Result, anyhow};
use comfy_table::{Cell, Color};
use rust_decimal::Decimal;
use tracing::info;

/// Renders every rule in the store as a table.
pub fn list(store: &AlertStore) -> Result<String> {
    let (book, warnings) = store.load()?;

    let mut out = String::new();
    for warning in &warnings {
        out.push_str(&ui::style_text(&warning.to_string(), ui::StyleType::Warning));
        out.push('\n');
    }
    if book.is_empty() {
        out.push_str(&ui::style_text(
            &format!("No alert rules in {}", store.path().display()),
            ui::StyleType::Subtle,
        ));
        return Ok(out);
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Symbol"),
        ui::header_cell("Direction"),
        ui::header_cell("Threshold"),
        ui::header_cell("State"),
    ]);
    for (id, rule) in book.iter() {
        let state = if rule.armed {
            Cell::new("armed").fg(Color::Green)
        } else {
            Cell::new("triggered").fg(Color::Yellow)
        };
        table.add_row(vec![
            Cell::new(id),
            Cell::new(&rule.symbol),
            Cell::new(rule.direction.to_string()),
            ui::number_cell(rule.threshold),
            state,
        ]);
    }
    out.push_str(&table.to_string());
    Ok(out)
}

pub fn add(
    store: &AlertStore,
    id: &str,
    symbol: &str,
    threshold: Decimal,
    direction: Direction,
) -> Result<()> {
    let (mut book, _) = store.load()?;
    book.insert(id, AlertRule::new(symbol, threshold, direction))?;
    store.save(&book)?;
    info!(id, symbol, %threshold, %direction, "Alert rule added");
    Ok(())
}

pub fn remove(store: &AlertStore, id: &str) -> Result<()> {
    let (mut book, _) = store.load()?;
    book.remove(id)
        .ok_or_else(|| anyhow!("Alert rule '{}' not found", id))?;
    store.save(&book)?;
    info!(id, "Alert rule removed");
    Ok(())
}

pub fn rearm(store: &AlertStore, id: &str) -> Result<()> {
    let (mut book, _) = store.load()?;
    book.rearm(id)?;
    store.save(&book)?;
    info!(id, "Alert rule re-armed");
    Ok(())
}
