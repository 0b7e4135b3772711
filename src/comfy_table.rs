use chrono::{DateTime, Utc};
use crossterm::style::{Stylize, style};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

use crate::analysis::Dashboard;
use crate::scorer::RankedRow;
use crate::storage_utils::DisplayConfig;

pub const MISSING: &str = "n/a";

pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|dt| dt.format("%d-%m-%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| "Never".to_string())
}

pub fn fmt_score(v: Option<f64>) -> String {
    v.map_or_else(|| MISSING.to_string(), |v| format!("{:.3}", v))
}

pub fn fmt_pct(v: Option<f64>) -> String {
    v.map_or_else(|| MISSING.to_string(), |v| format!("{:.2}%", v))
}

pub fn fmt_ratio(v: Option<f64>) -> String {
    v.map_or_else(|| MISSING.to_string(), |v| format!("{:.4}", v))
}

pub fn fmt_rsi(v: Option<f64>) -> String {
    v.map_or_else(|| MISSING.to_string(), |v| format!("{:.1}", v))
}

pub fn header_labels(rsi_enabled: bool) -> Vec<&'static str> {
    let mut labels = vec![
        "Rank",
        "Token",
        "Score",
        "7d Return",
        "14d Return",
        "Volume Trend",
        "Momentum",
        "High-Distance",
    ];
    if rsi_enabled {
        labels.push("RSI");
    }
    labels
}

/// Display strings for one row, in `header_labels` order.
pub fn row_values(rank: usize, ranked: &RankedRow, rsi_enabled: bool) -> Vec<String> {
    let mut values = vec![
        rank.to_string(),
        ranked.row.id.clone(),
        fmt_score(ranked.score),
        fmt_pct(ranked.row.change_7d),
        fmt_pct(ranked.row.change_14d),
        fmt_ratio(ranked.metrics.volume_trend),
        fmt_pct(ranked.metrics.momentum),
        fmt_ratio(ranked.metrics.high_distance),
    ];
    if rsi_enabled {
        values.push(fmt_rsi(ranked.rsi));
    }
    values
}

pub fn build_table(dashboard: &Dashboard, display: &DisplayConfig) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header_labels(dashboard.rsi_enabled)
                .into_iter()
                .enumerate()
                .map(|(i, label)| {
                    let cell = Cell::new(label).add_attribute(Attribute::Bold);
                    if i >= 2 {
                        cell.set_alignment(CellAlignment::Right)
                    } else {
                        cell
                    }
                }),
        );

    for (i, ranked) in dashboard.table.rows.iter().take(display.rows).enumerate() {
        let highlighted = i < display.highlight_top;
        let cells = row_values(i + 1, ranked, dashboard.rsi_enabled)
            .into_iter()
            .enumerate()
            .map(|(col, text)| {
                let mut cell = Cell::new(text);
                if col >= 2 {
                    cell = cell.set_alignment(CellAlignment::Right);
                }
                if col == 0 {
                    cell = cell.fg(Color::DarkGrey);
                }
                if highlighted {
                    cell = cell.bg(Color::Green).fg(Color::Black);
                }
                cell
            });
        table.add_row(cells);
    }

    table
}

/// Prints notices to stderr, then the snapshot time and ranked table.
pub fn run(dashboard: &Dashboard, display: &DisplayConfig) {
    for notice in &dashboard.notices {
        eprintln!("{}", style(notice).red());
    }

    if dashboard.table.is_empty() {
        println!("No data found.");
        return;
    }

    let title = format!(
        "Altcoin Strength Dashboard (Data taken at {} UTC, showing {} of {})",
        format_timestamp(dashboard.fetched_at),
        display.rows.min(dashboard.table.len()),
        dashboard.table.len()
    );
    let table = build_table(dashboard, display);
    println!("\n{}\n{}", title, table);
}
