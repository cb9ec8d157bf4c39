pub mod decision;
pub mod journal;
pub mod market;
pub mod paper;

pub use decision::*;
pub use journal::*;
pub use market::*;
pub use paper::*;

use async_trait::async_trait;

use crate::config::{Credentials, Settings, SettingsUpdate};
use crate::types::{LogEntry, MarketInfo, StatusSnapshot, TradeRecord};

/// Capability the control panel drives. Implementations own the trading
/// cycle, its timing and the history/log buffers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Agent: Send + Sync {
    /// Begins the periodic cycle. Returns false if it could not be started.
    async fn start(&self) -> bool;

    /// Halts the cycle. Returns false if it was not running.
    async fn stop(&self) -> bool;

    fn is_running(&self) -> bool;

    async fn get_status(&self) -> StatusSnapshot;

    async fn update_operation_settings(
        &self,
        interval_minutes: Option<u32>,
        max_investment: Option<u64>,
        max_trading_count: Option<u32>,
    );

    /// Returns true when some change only takes effect after a restart.
    async fn update_settings(&self, update: SettingsUpdate) -> bool;

    async fn get_market_info(&self) -> MarketInfo;

    async fn trading_history(&self) -> Vec<TradeRecord>;

    async fn logs(&self) -> Vec<LogEntry>;
}

/// Builds a fresh agent. Target instruments and risk level are part of
/// `settings` and must be applied before the agent is returned.
#[cfg_attr(test, mockall::automock)]
pub trait AgentFactory: Send + Sync {
    fn create(&self, credentials: &Credentials, settings: &Settings) -> anyhow::Result<Box<dyn Agent>>;
}
