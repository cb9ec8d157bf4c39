use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

use super::{ControlState, Session};
use crate::config::{Settings, SettingsForm};
use crate::types::{parse_timestamp, LogEntry, MarketInfo, StatusSnapshot, TradeRecord};

pub const REASON_PREVIEW_CHARS: usize = 50;
pub const VISIBLE_LOGS: usize = 10;

pub const AGENT_NOT_INITIALIZED: &str =
    "Agent has not been initialized. Please start the agent after configuring API keys.";
pub const NO_TRADE_HISTORY: &str = "No trade history yet.";
pub const MARKET_UNAVAILABLE: &str = "Unable to retrieve market information.";
pub const NO_LOGS: &str = "No log information available.";
pub const PREPARING: &str = "Preparing...";

/// Everything the operator sees, computed from one pass over the session.
#[derive(Debug, Clone, Serialize)]
pub struct PanelView {
    pub controls: ControlState,
    pub status: StatusView,
    pub history: HistoryView,
    pub market: MarketView,
    pub logs: LogView,
    pub settings: Settings,
    pub settings_form: SettingsForm,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusView {
    Uninitialized { message: String },
    Available(StatusPanel),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPanel {
    pub run_state: &'static str,
    pub status: String,
    pub next_check: String,
    pub time_until_next: Option<String>,
    pub last_check: String,
    pub daily_trades: String,
    pub interval_minutes: u32,
    pub model: String,
    pub progress: f64,
}

impl StatusView {
    /// Single-line rendering for terminals.
    pub fn summary(&self) -> String {
        match self {
            StatusView::Uninitialized { message } => message.clone(),
            StatusView::Available(panel) => {
                let next = match &panel.time_until_next {
                    Some(until) => format!("{} ({})", panel.next_check, until),
                    None => panel.next_check.clone(),
                };
                format!(
                    "[{}] {} | last check: {} | next check: {} | trades today: {} | progress: {:.0}%",
                    panel.run_state,
                    panel.status,
                    panel.last_check,
                    next,
                    panel.daily_trades,
                    panel.progress * 100.0
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HistoryView {
    Empty { message: String },
    Rows { rows: Vec<HistoryRow> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub time: String,
    pub action: &'static str,
    pub ticker: String,
    pub amount: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MarketView {
    Uninitialized { message: String },
    Unavailable { message: String },
    Tiles { tiles: Vec<MarketTile> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketTile {
    pub coin: String,
    pub price: String,
    pub change: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LogView {
    Empty { message: String },
    Lines { lines: Vec<LogLine> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogChannel {
    Error,
    Warning,
    Info,
}

impl LogChannel {
    pub fn for_level(level: &str) -> Self {
        match level {
            "ERROR" => LogChannel::Error,
            "WARNING" => LogChannel::Warning,
            _ => LogChannel::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub channel: LogChannel,
    pub text: String,
}

pub async fn render(session: &Session, now: NaiveDateTime) -> PanelView {
    let controls = session.controls();
    let settings = session.settings.clone();
    let settings_form = SettingsForm::from_settings(&session.settings);

    let Some(agent) = session.agent.as_deref() else {
        return PanelView {
            controls,
            status: StatusView::Uninitialized {
                message: AGENT_NOT_INITIALIZED.to_string(),
            },
            history: render_history(&[]),
            market: MarketView::Uninitialized {
                message: AGENT_NOT_INITIALIZED.to_string(),
            },
            logs: render_logs(&[]),
            settings,
            settings_form,
        };
    };

    let status = agent.get_status().await;
    let history = agent.trading_history().await;
    let market = agent.get_market_info().await;
    let logs = agent.logs().await;

    PanelView {
        controls,
        status: StatusView::Available(render_status(&status, now)),
        history: render_history(&history),
        market: render_market(&market),
        logs: render_logs(&logs),
        settings,
        settings_form,
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn render_status(status: &StatusSnapshot, now: NaiveDateTime) -> StatusPanel {
    let next_check = present(&status.next_check);

    StatusPanel {
        run_state: if status.is_running { "Running" } else { "Stopped" },
        status: status.status.clone(),
        next_check: next_check.unwrap_or(PREPARING).to_string(),
        time_until_next: minutes_until(next_check, now).map(|m| format!("in {} minutes", m)),
        last_check: present(&status.last_check).unwrap_or("None").to_string(),
        daily_trades: format!("{} / {}", status.daily_trading_count, status.max_trading_count),
        interval_minutes: status.interval_minutes,
        model: status.model.clone(),
        progress: progress_fraction(status, now),
    }
}

/// Whole minutes until `next_check`, or `None` when it is absent,
/// unparseable, or not in the future.
pub fn minutes_until(next_check: Option<&str>, now: NaiveDateTime) -> Option<i64> {
    let next = parse_timestamp(next_check?)?;
    if next <= now {
        return None;
    }
    Some((next - now).num_seconds() / 60)
}

/// Fraction of the current interval that has elapsed, always in [0, 1].
pub fn progress_fraction(status: &StatusSnapshot, now: NaiveDateTime) -> f64 {
    if !status.is_running {
        return 0.0;
    }
    let Some(next) = present(&status.next_check).and_then(parse_timestamp) else {
        return 0.0;
    };
    if next <= now {
        return 1.0;
    }

    let total = f64::from(status.interval_minutes) * 60.0;
    if total <= 0.0 {
        return 0.0;
    }
    let remaining = (next - now).num_milliseconds() as f64 / 1000.0;
    ((total - remaining) / total).clamp(0.0, 1.0)
}

pub fn truncate_reason(reason: &str) -> String {
    if reason.chars().count() > REASON_PREVIEW_CHARS {
        let head: String = reason.chars().take(REASON_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        reason.to_string()
    }
}

pub fn render_history(history: &[TradeRecord]) -> HistoryView {
    if history.is_empty() {
        return HistoryView::Empty {
            message: NO_TRADE_HISTORY.to_string(),
        };
    }

    let rows = history
        .iter()
        .map(|record| HistoryRow {
            time: record.timestamp.clone(),
            action: record.action.label(),
            ticker: record.ticker.clone(),
            amount: record.amount.to_string(),
            reason: truncate_reason(record.reason.as_deref().unwrap_or("")),
        })
        .collect();

    HistoryView::Rows { rows }
}

/// Integer part of `value` with `,` between each group of three digits.
pub fn group_thousands(value: Decimal) -> String {
    let whole = value.trunc();
    if whole.is_zero() {
        return "0".to_string();
    }

    let text = whole.abs().to_string();
    let mut grouped = String::with_capacity(text.len() + text.len() / 3 + 1);
    if whole.is_sign_negative() {
        grouped.push('-');
    }
    for (i, ch) in text.chars().enumerate() {
        if i > 0 && (text.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

pub fn render_market(market: &MarketInfo) -> MarketView {
    if market.is_empty() {
        return MarketView::Unavailable {
            message: MARKET_UNAVAILABLE.to_string(),
        };
    }

    let tiles = market
        .iter()
        .map(|(coin, quote)| MarketTile {
            coin: coin.clone(),
            price: format!("{} KRW", group_thousands(quote.current_price)),
            change: format!("{:.2}%", quote.change_rate),
            direction: if quote.change_rate.is_sign_negative() && !quote.change_rate.is_zero() {
                Direction::Down
            } else {
                Direction::Up
            },
        })
        .collect();

    MarketView::Tiles { tiles }
}

pub fn render_logs(logs: &[LogEntry]) -> LogView {
    if logs.is_empty() {
        return LogView::Empty {
            message: NO_LOGS.to_string(),
        };
    }

    let lines = logs
        .iter()
        .rev()
        .take(VISIBLE_LOGS)
        .map(|entry| LogLine {
            channel: LogChannel::for_level(&entry.level),
            text: format!("{}: {}", entry.timestamp, entry.message),
        })
        .collect();

    LogView::Lines { lines }
}
