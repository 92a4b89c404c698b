use super::ui;
use crate::core::football::CompetitionSnapshot;
use crate::core::portfolio::PortfolioReport;
use crate::core::quote::Quote;
use crate::core::scheduler::{DashboardSnapshot, Renderer, Tile};
use crate::core::weather::{DailySummary, WeatherSnapshot};
use comfy_table::{Cell, CellAlignment, Color};
use console::Term;
use rust_decimal::Decimal;
use tracing::debug;

const SPARKLINE_WIDTH: usize = 30;
const TABLE_ROWS: usize = 5;

/// Draws each snapshot to stdout.
pub struct TerminalRenderer {
    clear_screen: bool,
}

impl TerminalRenderer {
    /// `clear_screen` redraws in place, for the `watch` loop.
    pub fn new(clear_screen: bool) -> Self {
        TerminalRenderer { clear_screen }
    }
}

impl Renderer for TerminalRenderer {
    fn render(&self, snapshot: &DashboardSnapshot) {
        let output = render_dashboard(snapshot);
        let term = Term::stdout();
        if self.clear_screen && let Err(e) = term.clear_screen() {
            debug!("Could not clear terminal: {e}");
        }
        println!("{output}");
    }
}

pub fn render_dashboard(snapshot: &DashboardSnapshot) -> String {
    let status = format!(
        "cycle {} | updated {}",
        snapshot.cycle,
        snapshot.completed_at.format("%H:%M:%S UTC")
    );
    let mut out = format!(
        "{} {}\n",
        ui::style_text("Pulseboard", ui::StyleType::Title),
        ui::style_text(&status, ui::StyleType::Subtle)
    );
    for warning in &snapshot.warnings {
        out.push_str(&ui::style_text(warning, ui::StyleType::Warning));
        out.push('\n');
    }

    if !snapshot.triggered.is_empty() {
        let lines: Vec<String> = snapshot
            .triggered
            .iter()
            .map(|alert| {
                format!(
                    "{} {}",
                    ui::style_text(&format!("[{}]", alert.id), ui::StyleType::Warning),
                    alert.message()
                )
            })
            .collect();
        push_section(&mut out, "Alerts", &lines.join("\n"));
    }

    if !snapshot.quotes.is_empty() {
        push_section(&mut out, "Markets", &render_quotes(&snapshot.quotes));
    }

    if !snapshot.portfolio.positions.is_empty() {
        push_section(&mut out, "Portfolio", &render_portfolio(&snapshot.portfolio));
    }

    if !snapshot.weather.is_empty() {
        push_section(&mut out, "Weather", &render_weather(&snapshot.weather));
    }

    for (code, tile) in &snapshot.football {
        out.push('\n');
        out.push_str(&render_competition(code, tile));
        out.push('\n');
    }

    out
}

/// Appends a blank line, a styled title and the section body.
fn push_section(out: &mut String, title: &str, body: &str) {
    out.push_str(&format!(
        "\n{}\n{body}\n",
        ui::style_text(title, ui::StyleType::Title)
    ));
}

fn failure_note<T>(tile: &Tile<T>) -> Option<String> {
    tile.error().map(|e| match tile.value() {
        Some(_) => format!("stale: {e}"),
        None => e.to_string(),
    })
}

pub fn render_quotes(quotes: &[(String, Tile<Quote>)]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Class"),
        ui::header_cell("Price"),
        ui::header_cell("Change"),
        ui::header_cell("Trend"),
        ui::header_cell("As of"),
        ui::header_cell("Status"),
    ]);

    for (symbol, tile) in quotes {
        let status = failure_note(tile).map_or(Cell::new("ok").fg(Color::Green), |note| {
            ui::error_cell(&note)
        });
        match tile.value() {
            Some(quote) => {
                let history: Vec<Decimal> =
                    quote.recent_history.iter().map(|p| p.price).collect();
                let mut price = ui::number_cell(quote.price);
                if !tile.is_fresh() {
                    price = price.fg(Color::DarkGrey);
                }
                table.add_row(vec![
                    Cell::new(symbol),
                    Cell::new(quote.asset_class.to_string()),
                    price,
                    quote
                        .change_pct()
                        .map_or(ui::na_cell(false), ui::change_cell),
                    Cell::new(ui::sparkline(&history, SPARKLINE_WIDTH)),
                    Cell::new(quote.timestamp.format("%H:%M:%S").to_string()),
                    status,
                ]);
            }
            None => {
                table.add_row(vec![
                    Cell::new(symbol),
                    ui::na_cell(true),
                    ui::na_cell(true),
                    ui::na_cell(true),
                    Cell::new(""),
                    Cell::new(""),
                    status,
                ]);
            }
        }
    }
    table.to_string()
}

pub fn render_portfolio(report: &PortfolioReport) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Qty"),
        ui::header_cell("Cost basis"),
        ui::header_cell("Price"),
        ui::header_cell("Value"),
        ui::header_cell("P/L"),
        ui::header_cell("P/L (%)"),
        ui::header_cell("Weight (%)"),
    ]);

    for position in &report.positions {
        let weight = report
            .allocation
            .get(&position.symbol)
            .copied()
            .unwrap_or_default();
        let price = match position.price {
            Some(price) => ui::number_cell(price),
            None => Cell::new("stale")
                .fg(Color::Yellow)
                .set_alignment(CellAlignment::Right),
        };
        table.add_row(vec![
            Cell::new(&position.symbol),
            Cell::new(position.quantity.normalize().to_string())
                .set_alignment(CellAlignment::Right),
            ui::number_cell(position.cost_basis),
            price,
            ui::number_cell(position.current_value),
            ui::pl_cell(position.pl),
            ui::change_cell(position.pl_pct),
            ui::format_optional_cell(Some(weight), |w| format!("{w:.2}%")),
        ]);
    }

    let total_style = if report.has_stale() {
        ui::StyleType::Warning
    } else {
        ui::StyleType::TotalValue
    };
    table.add_row(vec![
        Cell::new(ui::style_text("Total", ui::StyleType::TotalLabel)),
        Cell::new(""),
        ui::number_cell(report.total_cost),
        Cell::new(""),
        Cell::new(ui::style_text(
            &format!("{:.2}", report.total_value),
            total_style,
        ))
        .set_alignment(CellAlignment::Right),
        ui::pl_cell(report.total_pl),
        ui::change_cell(report.total_pl_pct),
        Cell::new(""),
    ]);
    table.to_string()
}

fn daily_line(day: &DailySummary, symbol: &str) -> String {
    let temp = |t: Option<f64>| t.map_or("-".to_string(), |v| format!("{v:.0}"));
    let mut line = format!(
        "{} {}/{}{}",
        day.date.format("%a %d"),
        temp(day.low),
        temp(day.high),
        symbol
    );
    if day.precipitation_mm > 0.0 {
        line.push_str(&format!(" {:.1}mm", day.precipitation_mm));
    }
    line
}

fn weather_row(snapshot: &WeatherSnapshot) -> Vec<Cell> {
    let symbol = snapshot.units.temperature_symbol();
    let highs: Vec<Decimal> = snapshot
        .history
        .iter()
        .filter_map(|d| d.high.and_then(|h| Decimal::try_from(h).ok()))
        .collect();
    let forecast = snapshot
        .forecast
        .iter()
        .map(|d| daily_line(d, symbol))
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        Cell::new(&snapshot.location),
        Cell::new(format!(
            "{:.1}{symbol} (feels {:.1}{symbol})",
            snapshot.current.temperature, snapshot.current.feels_like
        )),
        Cell::new(format!(
            "{}: {}",
            snapshot.current.summary, snapshot.current.description
        )),
        Cell::new(ui::sparkline(&highs, SPARKLINE_WIDTH)),
        Cell::new(forecast),
    ]
}

pub fn render_weather(weather: &[(String, Tile<WeatherSnapshot>)]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Location"),
        ui::header_cell("Now"),
        ui::header_cell("Conditions"),
        ui::header_cell("Past 7d highs"),
        ui::header_cell("Forecast"),
    ]);

    for (location, tile) in weather {
        match (tile.value(), failure_note(tile)) {
            (Some(snapshot), None) => {
                table.add_row(weather_row(snapshot));
            }
            (Some(snapshot), Some(note)) => {
                let mut row = weather_row(snapshot);
                row[0] = Cell::new(format!("{}\n{note}", snapshot.location)).fg(Color::Red);
                table.add_row(row);
            }
            (None, note) => {
                table.add_row(vec![
                    Cell::new(location),
                    ui::error_cell(&note.unwrap_or_default()),
                    Cell::new(""),
                    Cell::new(""),
                    Cell::new(""),
                ]);
            }
        }
    }
    table.to_string()
}

pub fn render_competition(code: &str, tile: &Tile<CompetitionSnapshot>) -> String {
    let Some(competition) = tile.value() else {
        return format!(
            "{}\n{}",
            ui::style_text(code, ui::StyleType::Title),
            ui::style_text(&failure_note(tile).unwrap_or_default(), ui::StyleType::Error)
        );
    };

    let mut out = ui::style_text(&competition.name, ui::StyleType::Title);
    if let Some(note) = failure_note(tile) {
        out.push(' ');
        out.push_str(&ui::style_text(&note, ui::StyleType::Error));
    }
    out.push('\n');

    if competition.matches_today.is_empty() {
        out.push_str(&ui::style_text("No matches today", ui::StyleType::Subtle));
        out.push('\n');
    } else {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Kickoff"),
            ui::header_cell("Home"),
            ui::header_cell("Score"),
            ui::header_cell("Away"),
            ui::header_cell("Status"),
        ]);
        for m in &competition.matches_today {
            table.add_row(vec![
                Cell::new(&m.kickoff_utc),
                Cell::new(&m.home),
                Cell::new(m.score_line()).set_alignment(CellAlignment::Center),
                Cell::new(&m.away),
                Cell::new(&m.status),
            ]);
        }
        out.push_str(&table.to_string());
        out.push('\n');
    }

    let mut standings = ui::new_styled_table();
    standings.set_header(vec![
        ui::header_cell("#"),
        ui::header_cell("Team"),
        ui::header_cell("P"),
        ui::header_cell("W"),
        ui::header_cell("D"),
        ui::header_cell("L"),
        ui::header_cell("GD"),
        ui::header_cell("Pts"),
    ]);
    for row in competition.standings.iter().take(TABLE_ROWS) {
        let goal_difference = i64::from(row.goals_for) - i64::from(row.goals_against);
        standings.add_row(vec![
            Cell::new(row.position),
            Cell::new(&row.team),
            Cell::new(row.played),
            Cell::new(row.won),
            Cell::new(row.draw),
            Cell::new(row.lost),
            Cell::new(format!("{goal_difference:+}")),
            Cell::new(row.points).add_attribute(comfy_table::Attribute::Bold),
        ]);
    }
    out.push_str(&standings.to_string());
    out.push('\n');

    let mut scorers = ui::new_styled_table();
    scorers.set_header(vec![
        ui::header_cell("Player"),
        ui::header_cell("Team"),
        ui::header_cell("Goals"),
        ui::header_cell("Assists"),
    ]);
    for scorer in competition.scorers.iter().take(TABLE_ROWS) {
        scorers.add_row(vec![
            Cell::new(&scorer.player),
            Cell::new(&scorer.team),
            Cell::new(scorer.goals),
            ui::format_optional_cell(scorer.assists, |a| a.to_string()),
        ]);
    }
    out.push_str(&scorers.to_string());
    out
}
