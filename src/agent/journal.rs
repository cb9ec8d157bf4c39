use std::collections::VecDeque;
use tracing::{error, info, warn};

use crate::types::{LogEntry, LogLevel, TradeRecord};

pub const MAX_LOGS: usize = 1000;

/// Append-only trade history plus a bounded log buffer. Logs are kept
/// oldest-first; once `MAX_LOGS` is reached the oldest entry is dropped.
#[derive(Debug, Default)]
pub struct Journal {
    history: Vec<TradeRecord>,
    logs: VecDeque<LogEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);

        match level {
            LogLevel::Info => info!("{}", entry.message),
            LogLevel::Warning => warn!("{}", entry.message),
            LogLevel::Error => error!("{}", entry.message),
        }

        self.logs.push_back(entry);
        if self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn record_trade(&mut self, record: TradeRecord) {
        self.history.push(record);
    }

    pub fn history(&self) -> &[TradeRecord] {
        &self.history
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.iter().cloned().collect()
    }
}
