use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};
use std::io;
use std::time::Duration;

use crate::analysis::{self, Dashboard};
use crate::comfy_table::{
    MISSING, fmt_pct, fmt_ratio, fmt_rsi, fmt_score, format_timestamp, header_labels, row_values,
};
use crate::market_data::{MarketDataService, MarketDataSource};
use crate::scorer::RankedRow;
use crate::storage_utils::AppConfig;

// --- App State ---

struct App {
    data: Dashboard,
    table_state: TableState,
    is_refreshing: bool,
    highlight_top: usize,
}

impl App {
    fn new(data: Dashboard, highlight_top: usize) -> Self {
        let mut table_state = TableState::default();
        if !data.table.is_empty() {
            table_state.select(Some(0));
        }
        Self {
            data,
            table_state,
            is_refreshing: false,
            highlight_top,
        }
    }

    fn set_data(&mut self, new_data: Dashboard) {
        let len = new_data.table.len();
        self.data = new_data;
        self.is_refreshing = false;
        let selected = match (self.table_state.selected(), len) {
            (_, 0) => None,
            (Some(i), len) => Some(i.min(len - 1)),
            (None, _) => Some(0),
        };
        self.table_state.select(selected);
    }

    fn selected_row(&self) -> Option<&RankedRow> {
        self.table_state
            .selected()
            .and_then(|i| self.data.table.rows.get(i))
    }

    fn move_selection(&mut self, step: isize) {
        let len = self.data.table.len();
        if len == 0 {
            return;
        }
        let current = self.table_state.selected().unwrap_or(0) as isize;
        let next = (current + step).rem_euclid(len as isize) as usize;
        self.table_state.select(Some(next));
    }
}

// --- TUI ---

/// Full-screen dashboard. F5 re-runs the pipeline through `service`, so a
/// refresh inside the cache window redraws the same snapshot.
pub async fn run_tui<S: MarketDataSource>(
    service: &mut MarketDataService<S>,
    config: &AppConfig,
    initial: Dashboard,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, service, config, initial).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

async fn run_app<B: Backend, S: MarketDataSource>(
    terminal: &mut Terminal<B>,
    service: &mut MarketDataService<S>,
    config: &AppConfig,
    initial: Dashboard,
) -> Result<()> {
    let mut app = App::new(initial, config.display.highlight_top);

    loop {
        terminal.draw(|f| ui(f, &mut app))?;

        // The popup is on screen now; run the pipeline inline.
        if app.is_refreshing {
            let dashboard = analysis::run_analysis_pipeline(service, &config.rsi).await;
            app.set_data(dashboard);
            continue;
        }

        if event::poll(Duration::from_millis(250))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if !handle_key_event(key, &mut app) {
                        return Ok(());
                    }
                }
                // Next draw picks up the new size.
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }
}

fn handle_key_event(key: KeyEvent, app: &mut App) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::F(5) if !app.is_refreshing => app.is_refreshing = true,
        KeyCode::Up | KeyCode::Char('k') => app.move_selection(-1),
        KeyCode::Down | KeyCode::Char('j') => app.move_selection(1),
        KeyCode::PageUp => app.move_selection(-10),
        KeyCode::PageDown => app.move_selection(10),
        KeyCode::Home => {
            if !app.data.table.is_empty() {
                app.table_state.select(Some(0));
            }
        }
        KeyCode::End => {
            if !app.data.table.is_empty() {
                app.table_state.select(Some(app.data.table.len() - 1));
            }
        }
        _ => {}
    }
    true
}

fn ui(f: &mut Frame, app: &mut App) {
    let main_layout = Layout::horizontal([Constraint::Percentage(72), Constraint::Percentage(28)])
        .split(f.size());

    let left_chunks =
        Layout::vertical([Constraint::Length(3 + app.data.notices.len() as u16), Constraint::Min(0)])
            .split(main_layout[0]);

    // Status block: snapshot time plus any notices
    let time_str = format_timestamp(app.data.fetched_at);
    let notice_lines: Vec<Line> = app
        .data
        .notices
        .iter()
        .map(|n| Line::from(Span::styled(n.clone(), Style::default().fg(Color::Red))))
        .collect();
    f.render_widget(
        Paragraph::new(notice_lines)
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title_alignment(Alignment::Center)
                    .title(format!("Altcoin Strength Dashboard - Last Updated: {} UTC", time_str)),
            ),
        left_chunks[0],
    );

    render_ranking(f, app, left_chunks[1]);

    // Sidebar: details of the selected token
    let sidebar_block = Block::default()
        .borders(Borders::ALL)
        .title("Token")
        .title_alignment(Alignment::Center);
    let inner_sidebar_area = sidebar_block.inner(main_layout[1]);
    f.render_widget(sidebar_block, main_layout[1]);

    let sidebar_chunks = Layout::vertical([
        Constraint::Min(1),    // token details
        Constraint::Length(1), // key help
    ])
    .split(inner_sidebar_area);

    let details = app.selected_row().map(detail_lines).unwrap_or_default();
    f.render_widget(Paragraph::new(details), sidebar_chunks[0]);

    f.render_widget(
        Paragraph::new("F5 refresh | \u{2191}\u{2193} select | q quit").alignment(Alignment::Center),
        sidebar_chunks[1],
    );

    if app.is_refreshing {
        let area = centered_rect(60, 20, main_layout[0]);
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new("Running analysis pipeline...\nPlease wait.")
                .block(Block::default().title("Refreshing").borders(Borders::ALL))
                .alignment(Alignment::Center),
            area,
        );
    }
}

fn render_ranking(f: &mut Frame, app: &mut App, area: Rect) {
    let rsi_enabled = app.data.rsi_enabled;
    let header = Row::new(header_labels(rsi_enabled))
        .style(Style::default().bg(Color::DarkGray));

    let top_score = app
        .data
        .table
        .rows
        .first()
        .and_then(|r| r.score)
        .unwrap_or(1.0);

    let rows = app.data.table.rows.iter().enumerate().map(|(i, ranked)| {
        let values = row_values(i + 1, ranked, rsi_enabled);
        let row = if i < app.highlight_top {
            Row::new(values)
                .style(Style::default().bg(Color::Green).fg(Color::Black))
        } else {
            let shade = (255.0 * get_visibility_ratio(ranked.score, top_score)) as u8;
            Row::new(values.into_iter().enumerate().map(|(col, text)| {
                let style = match col {
                    0 => Style::default().fg(Color::DarkGray),
                    1 | 2 => Style::default().fg(Color::Rgb(0, shade, shade)),
                    _ => Style::default(),
                };
                Cell::from(text).style(style)
            }))
        };
        row.height(1)
    });

    let mut widths = vec![
        Constraint::Length(5),  // Rank
        Constraint::Min(14),    // Token
        Constraint::Length(7),  // Score
        Constraint::Length(10), // 7d Return
        Constraint::Length(10), // 14d Return
        Constraint::Length(12), // Volume Trend
        Constraint::Length(9),  // Momentum
        Constraint::Length(13), // High-Distance
    ];
    if rsi_enabled {
        widths.push(Constraint::Length(6));
    }

    let title = format!("Ranked by Strength Score ({} tokens)", app.data.table.len());
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn detail_lines(ranked: &RankedRow) -> Vec<Line<'static>> {
    let row = &ranked.row;
    let price = |v: Option<f64>| v.map_or_else(|| MISSING.to_string(), |v| format!("${}", v));
    let big = |v: Option<f64>| v.map_or_else(|| MISSING.to_string(), |v| format!("${:.0}", v));

    let field = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{:<14}", label), Style::default().fg(Color::DarkGray)),
            Span::raw(value),
        ])
    };

    vec![
        Line::from(Span::styled(
            format!("{} ({})", row.name, row.symbol.to_uppercase()),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        field("id", row.id.clone()),
        Line::default(),
        field("Price", price(row.current_price)),
        field("24h High", price(row.high_24h)),
        field("Market Cap", big(row.market_cap)),
        field("Volume", big(row.total_volume)),
        Line::default(),
        field("1h", fmt_pct(row.change_1h)),
        field("24h", fmt_pct(row.change_24h)),
        field("7d", fmt_pct(row.change_7d)),
        field("14d", fmt_pct(row.change_14d)),
        Line::default(),
        field("Volume Trend", fmt_ratio(ranked.metrics.volume_trend)),
        field("Momentum", fmt_pct(ranked.metrics.momentum)),
        field("High-Distance", fmt_ratio(ranked.metrics.high_distance)),
        field("RSI (14)", fmt_rsi(ranked.rsi)),
        Line::default(),
        field("Score", fmt_score(ranked.score)),
    ]
}

/// Brightness for a row relative to the best score, floored at 0.4.
fn get_visibility_ratio(score: Option<f64>, top_score: f64) -> f64 {
    match score {
        None => 0.4,
        Some(_) if top_score <= 0.0 => 1.0,
        Some(score) => (0.4 + 0.6 * (score / top_score)).clamp(0.4, 1.0),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}
