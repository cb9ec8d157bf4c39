use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    coin_symbol, collect_market_info, exchange_ticker, Agent, AgentFactory, DecisionContext, DecisionEngine,
    Journal, MarketFeed, MomentumDecider, PriceMode,
};
use crate::config::{Credentials, Settings, SettingsUpdate};
use crate::types::{
    format_timestamp, LogEntry, LogLevel, MarketInfo, PriceType, Side, StatusSnapshot, TradeAmount,
    TradeRecord,
};

/// Smallest order the exchange accepts, in quote currency.
pub const MIN_ORDER_AMOUNT: Decimal = dec!(5000);
/// Share of cash used when the requested amount exceeds the balance.
const CASH_BUFFER: Decimal = dec!(0.95);
const STOP_TIMEOUT: Duration = Duration::from_secs(10);
const UNIT_PRECISION: u32 = 8;

pub mod status {
    pub const READY: &str = "Ready";
    pub const STARTED: &str = "Started";
    pub const ANALYZING: &str = "Analyzing...";
    pub const WAITING: &str = "Waiting";
    pub const ANALYSIS_FAILED: &str = "Analysis failed";
    pub const ERROR_OCCURRED: &str = "Error occurred";
    pub const STOPPED: &str = "Stopped";
}

#[derive(Debug, Clone, Default)]
pub struct Wallet {
    pub cash: Decimal,
    /// Units held per instrument (`BTC`).
    pub holdings: HashMap<String, Decimal>,
}

struct AgentState {
    settings: Settings,
    status: &'static str,
    last_check: Option<NaiveDateTime>,
    next_check: Option<NaiveDateTime>,
    daily_trading_count: u32,
    last_trading_date: Option<NaiveDate>,
}

impl AgentState {
    /// Resets the daily counter the first time it is touched on a new day.
    fn roll_daily_counter(&mut self, today: NaiveDate) {
        if self.last_trading_date != Some(today) {
            self.last_trading_date = Some(today);
            self.daily_trading_count = 0;
        }
    }

    fn limit_reached(&self) -> bool {
        self.daily_trading_count >= self.settings.max_trading_count
    }
}

struct PaperInner {
    credentials: Credentials,
    feed: Arc<dyn MarketFeed>,
    decider: Arc<dyn DecisionEngine>,
    is_running: AtomicBool,
    state: RwLock<AgentState>,
    wallet: RwLock<Wallet>,
    journal: RwLock<Journal>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    trade_tx: broadcast::Sender<TradeRecord>,
}

/// Reference agent that trades a simulated wallet against a market feed.
/// Orders fill immediately at the current (or limit) price.
pub struct PaperAgent {
    inner: Arc<PaperInner>,
}

impl PaperAgent {
    pub fn new(
        credentials: Credentials,
        settings: Settings,
        feed: Arc<dyn MarketFeed>,
        decider: Arc<dyn DecisionEngine>,
        initial_cash: Decimal,
        trade_tx: broadcast::Sender<TradeRecord>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(PaperInner {
                credentials,
                feed,
                decider,
                is_running: AtomicBool::new(false),
                state: RwLock::new(AgentState {
                    settings,
                    status: status::READY,
                    last_check: None,
                    next_check: None,
                    daily_trading_count: 0,
                    last_trading_date: None,
                }),
                wallet: RwLock::new(Wallet {
                    cash: initial_cash,
                    holdings: HashMap::new(),
                }),
                journal: RwLock::new(Journal::new()),
                stop_tx,
                task: Mutex::new(None),
                trade_tx,
            }),
        }
    }
}

#[cfg(test)]
impl PaperAgent {
    pub fn subscribe_trades(&self) -> broadcast::Receiver<TradeRecord> {
        self.inner.trade_tx.subscribe()
    }

    pub async fn wallet(&self) -> Wallet {
        self.inner.wallet.read().await.clone()
    }

    pub async fn buy(
        &self,
        coin: &str,
        price_type: PriceType,
        amount: Decimal,
        limit_price: Option<Decimal>,
        reason: &str,
    ) -> Result<TradeRecord, String> {
        self.inner.buy(coin, price_type, amount, limit_price, reason).await
    }

    pub async fn sell(
        &self,
        coin: &str,
        price_type: PriceType,
        amount: TradeAmount,
        limit_price: Option<Decimal>,
        reason: &str,
    ) -> Result<TradeRecord, String> {
        self.inner.sell(coin, price_type, amount, limit_price, reason).await
    }

    /// Runs a single analysis cycle outside the periodic loop.
    pub async fn run_cycle(&self) {
        self.inner.check_and_trade().await;
    }
}

impl Drop for PaperAgent {
    fn drop(&mut self) {
        // A discarded agent must not keep trading in the background.
        self.inner.is_running.store(false, Ordering::Release);
        let _ = self.inner.stop_tx.send(true);
    }
}

impl PaperInner {
    async fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.journal.write().await.log(level, message);
    }

    async fn buy(
        &self,
        coin: &str,
        price_type: PriceType,
        amount: Decimal,
        limit_price: Option<Decimal>,
        reason: &str,
    ) -> Result<TradeRecord, String> {
        let ticker = exchange_ticker(coin);
        self.log(
            LogLevel::Info,
            format!("Buy request: {} {} KRW ({:?})", ticker, amount, price_type),
        )
        .await;

        let mut state = self.state.write().await;
        state.roll_daily_counter(Local::now().date_naive());
        if state.limit_reached() {
            return Err(format!(
                "Skipping trade as it exceeds maximum daily trading count ({}).",
                state.settings.max_trading_count
            ));
        }

        let mut wallet = self.wallet.write().await;
        let mut amount = amount.min(Decimal::from(state.settings.max_investment));
        if wallet.cash < amount {
            self.log(
                LogLevel::Warning,
                format!("Adjusting trade amount due to insufficient KRW balance ({}).", wallet.cash),
            )
            .await;
            amount = (wallet.cash * CASH_BUFFER).round_dp(0);
        }
        if amount < MIN_ORDER_AMOUNT {
            return Err(format!(
                "Skipping trade as amount ({} KRW) is less than minimum order amount ({} KRW)",
                amount, MIN_ORDER_AMOUNT
            ));
        }

        let fill_price = self.fill_price(&ticker, price_type, limit_price).await?;
        let units = (amount / fill_price).round_dp(UNIT_PRECISION);

        wallet.cash -= amount;
        *wallet.holdings.entry(coin_symbol(coin)).or_insert(Decimal::ZERO) += units;

        let record = TradeRecord {
            timestamp: format_timestamp(Local::now().naive_local()),
            action: Side::Buy,
            ticker,
            amount: TradeAmount::Quote(amount),
            price_type: Some(price_type),
            limit_price: limit_price.filter(|_| price_type == PriceType::Limit),
            order_id: Some(Uuid::new_v4().to_string()),
            reason: Some(reason.to_string()),
        };
        state.daily_trading_count += 1;
        drop(wallet);
        drop(state);

        self.record(record.clone()).await;
        Ok(record)
    }

    async fn sell(
        &self,
        coin: &str,
        price_type: PriceType,
        amount: TradeAmount,
        limit_price: Option<Decimal>,
        reason: &str,
    ) -> Result<TradeRecord, String> {
        let ticker = exchange_ticker(coin);
        self.log(
            LogLevel::Info,
            format!("Sell request: {} {} ({:?})", ticker, amount, price_type),
        )
        .await;

        let mut state = self.state.write().await;
        state.roll_daily_counter(Local::now().date_naive());
        if state.limit_reached() {
            return Err(format!(
                "Skipping trade as it exceeds maximum daily trading count ({}).",
                state.settings.max_trading_count
            ));
        }

        let mut wallet = self.wallet.write().await;
        let key = coin_symbol(coin);
        let held = wallet.holdings.get(&key).copied().unwrap_or(Decimal::ZERO);
        if held <= Decimal::ZERO {
            return Err(format!("Skipping sell as there is no {} balance.", ticker));
        }

        let (volume, recorded) = match amount {
            TradeAmount::All => (held, TradeAmount::All),
            TradeAmount::Units(units) if units > Decimal::ZERO => {
                if units > held {
                    self.log(
                        LogLevel::Warning,
                        format!("Sell amount ({}) exceeds balance ({}).", units, held),
                    )
                    .await;
                }
                let volume = units.min(held);
                (volume, TradeAmount::Units(volume))
            }
            other => {
                return Err(format!(
                    "Invalid sell amount: {}. Please specify a positive quantity or 'all'.",
                    other
                ))
            }
        };

        let fill_price = self.fill_price(&ticker, price_type, limit_price).await?;
        let proceeds = (volume * fill_price).round_dp(0);

        wallet.cash += proceeds;
        let remaining = held - volume;
        if remaining.is_zero() {
            wallet.holdings.remove(&key);
        } else {
            wallet.holdings.insert(key, remaining);
        }

        let record = TradeRecord {
            timestamp: format_timestamp(Local::now().naive_local()),
            action: Side::Sell,
            ticker,
            amount: recorded,
            price_type: Some(price_type),
            limit_price: limit_price.filter(|_| price_type == PriceType::Limit),
            order_id: Some(Uuid::new_v4().to_string()),
            reason: Some(reason.to_string()),
        };
        state.daily_trading_count += 1;
        drop(wallet);
        drop(state);

        self.record(record.clone()).await;
        Ok(record)
    }

    async fn fill_price(
        &self,
        ticker: &str,
        price_type: PriceType,
        limit_price: Option<Decimal>,
    ) -> Result<Decimal, String> {
        match price_type {
            PriceType::Limit => match limit_price {
                Some(price) if price > Decimal::ZERO => Ok(price),
                _ => Err("Valid price is required for limit orders.".to_string()),
            },
            PriceType::Market => match self.feed.current_price(ticker).await {
                Ok(price) if price > Decimal::ZERO => Ok(price),
                Ok(price) => Err(format!("Invalid market price for {}: {}", ticker, price)),
                Err(e) => Err(format!("Failed to get current price for {}: {}", ticker, e)),
            },
        }
    }

    async fn record(&self, record: TradeRecord) {
        {
            let mut journal = self.journal.write().await;
            journal.record_trade(record.clone());
            journal.log(
                LogLevel::Info,
                format!(
                    "{} order completed: {}, Order ID: {}",
                    record.action.label(),
                    record.ticker,
                    record.order_id.as_deref().unwrap_or("-")
                ),
            );
        }

        if self.trade_tx.send(record.clone()).is_ok() {
            debug!(
                "Trade notification sent: {} {} {}",
                record.timestamp, record.action, record.ticker
            );
        }
    }

    async fn check_and_trade(&self) {
        let settings = {
            let mut state = self.state.write().await;
            let now = Local::now().naive_local();
            state.status = status::ANALYZING;
            state.last_check = Some(now);
            state.next_check = Some(now + chrono::Duration::minutes(i64::from(state.settings.interval_minutes)));
            state.roll_daily_counter(now.date());
            state.settings.clone()
        };
        self.log(LogLevel::Info, "Starting market analysis and trading decision").await;

        let market = match collect_market_info(self.feed.as_ref(), &settings.target_coins, PriceMode::Fresh).await {
            Ok(market) if !market.is_empty() => market,
            Ok(_) => {
                self.log(LogLevel::Warning, "No market data available for the target coins.").await;
                self.state.write().await.status = status::ANALYSIS_FAILED;
                return;
            }
            Err(e) => {
                self.log(LogLevel::Error, format!("Failed to get market information: {}", e)).await;
                self.state.write().await.status = status::ERROR_OCCURRED;
                return;
            }
        };

        let remaining_trades = {
            let state = self.state.read().await;
            state.settings.max_trading_count.saturating_sub(state.daily_trading_count)
        };
        let wallet = self.wallet.read().await.clone();

        let intents = self.decider.decide(&DecisionContext {
            market: &market,
            holdings: &wallet.holdings,
            cash: wallet.cash,
            max_investment: Decimal::from(settings.max_investment),
            risk_level: settings.risk_level,
            remaining_trades,
        });

        if intents.is_empty() {
            self.log(
                LogLevel::Info,
                format!(
                    "No trade this cycle ({} decision, {} risk profile).",
                    self.decider.name(),
                    settings.risk_level
                ),
            )
            .await;
        }

        for intent in intents {
            let outcome = match (intent.side, intent.amount) {
                (Side::Buy, TradeAmount::Quote(quote)) => {
                    self.buy(&intent.coin, intent.price_type, quote, intent.limit_price, &intent.reason)
                        .await
                }
                (Side::Buy, other) => Err(format!("Buy orders must be sized in KRW, got {}", other)),
                (Side::Sell, amount) => {
                    self.sell(&intent.coin, intent.price_type, amount, intent.limit_price, &intent.reason)
                        .await
                }
            };

            if let Err(message) = outcome {
                self.log(LogLevel::Warning, message).await;
            }
        }

        self.state.write().await.status = status::WAITING;
        self.log(LogLevel::Info, "Trading cycle completed").await;
    }

    async fn run_loop(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        self.log(LogLevel::Info, "Starting automatic trading loop").await;

        while self.is_running.load(Ordering::Acquire) {
            self.check_and_trade().await;

            let wait_seconds = u64::from(self.state.read().await.settings.interval_minutes) * 60;
            self.log(
                LogLevel::Info,
                format!("Next analysis scheduled in {} seconds", wait_seconds),
            )
            .await;

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(wait_seconds)) => {}
                _ = stop_rx.changed() => {
                    debug!("Trading loop received stop signal");
                }
            }
        }
    }
}

#[async_trait]
impl Agent for PaperAgent {
    async fn start(&self) -> bool {
        let inner = &self.inner;
        if inner.is_running.load(Ordering::Acquire) {
            return false;
        }

        if !inner.credentials.has_exchange_keys() {
            inner.log(LogLevel::Error, "Exchange API keys are not set.").await;
            return false;
        }
        if !inner.credentials.has_model_key() {
            inner.log(LogLevel::Error, "Model API key is not set.").await;
            return false;
        }
        if let Err(e) = inner.feed.ping().await {
            inner
                .log(
                    LogLevel::Error,
                    format!("Failed to get market information. Check your API keys. ({})", e),
                )
                .await;
            return false;
        }

        if inner
            .is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        inner.state.write().await.status = status::STARTED;
        inner.log(LogLevel::Info, "Automatic trading started").await;

        let _ = inner.stop_tx.send(false);
        let stop_rx = inner.stop_tx.subscribe();
        let handle = tokio::spawn(Arc::clone(inner).run_loop(stop_rx));
        *inner.task.lock().await = Some(handle);

        true
    }

    async fn stop(&self) -> bool {
        let inner = &self.inner;
        if !inner.is_running.swap(false, Ordering::AcqRel) {
            return false;
        }

        let _ = inner.stop_tx.send(true);
        inner.state.write().await.status = status::STOPPED;

        if let Some(mut handle) = inner.task.lock().await.take() {
            if tokio::time::timeout(STOP_TIMEOUT, &mut handle).await.is_err() {
                warn!("Trading loop did not finish within {:?}, aborting", STOP_TIMEOUT);
                handle.abort();
            }
        }

        // An in-flight cycle may have finished with its own status.
        inner.state.write().await.status = status::STOPPED;
        inner.log(LogLevel::Info, "Automatic trading stopped").await;
        true
    }

    fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::Acquire)
    }

    async fn get_status(&self) -> StatusSnapshot {
        let state = self.inner.state.read().await;
        let trading_history_count = self.inner.journal.read().await.history().len();

        StatusSnapshot {
            status: state.status.to_string(),
            is_running: self.is_running(),
            last_check: state.last_check.map(format_timestamp),
            next_check: state.next_check.map(format_timestamp),
            daily_trading_count: state.daily_trading_count,
            max_trading_count: state.settings.max_trading_count,
            interval_minutes: state.settings.interval_minutes,
            trading_history_count,
            model: state.settings.model.clone(),
        }
    }

    async fn update_operation_settings(
        &self,
        interval_minutes: Option<u32>,
        max_investment: Option<u64>,
        max_trading_count: Option<u32>,
    ) {
        let mut changes = Vec::new();
        {
            let mut state = self.inner.state.write().await;
            if let Some(interval) = interval_minutes {
                state.settings.interval_minutes = interval;
                changes.push(format!("Analysis interval set to {} minutes.", interval));
            }
            if let Some(investment) = max_investment {
                state.settings.max_investment = investment;
                changes.push(format!("Maximum investment amount set to {} KRW.", investment));
            }
            if let Some(count) = max_trading_count {
                state.settings.max_trading_count = count;
                changes.push(format!("Maximum daily trading count set to {}.", count));
            }
        }

        for change in changes {
            self.inner.log(LogLevel::Info, change).await;
        }
    }

    async fn update_settings(&self, update: SettingsUpdate) -> bool {
        let mut restart_required = false;
        let mut state = self.inner.state.write().await;
        let settings = &mut state.settings;

        if let Some(interval) = update.interval_minutes {
            if settings.interval_minutes != interval {
                settings.interval_minutes = interval;
                restart_required = true;
            }
        }
        if let Some(investment) = update.max_investment {
            settings.max_investment = investment;
        }
        if let Some(count) = update.max_trading_count {
            settings.max_trading_count = count;
        }
        if let Some(coins) = update.target_coins {
            settings.target_coins = coins.iter().map(|coin| coin_symbol(coin)).collect();
        }
        if let Some(risk) = update.risk_level {
            settings.risk_level = risk;
        }
        if let Some(model) = update.model {
            if settings.model != model {
                settings.model = model;
                restart_required = true;
            }
        }

        debug!("Settings updated, restart required: {}", restart_required);
        restart_required
    }

    async fn get_market_info(&self) -> MarketInfo {
        let coins = self.inner.state.read().await.settings.target_coins.clone();
        match collect_market_info(self.inner.feed.as_ref(), &coins, PriceMode::Peek).await {
            Ok(info) => info,
            Err(e) => {
                self.inner
                    .log(LogLevel::Error, format!("Failed to get market information: {}", e))
                    .await;
                MarketInfo::new()
            }
        }
    }

    async fn trading_history(&self) -> Vec<TradeRecord> {
        self.inner.journal.read().await.history().to_vec()
    }

    async fn logs(&self) -> Vec<LogEntry> {
        self.inner.journal.read().await.logs()
    }
}

/// Builds paper agents that share one market feed, so prices stay
/// continuous across restarts, and one trade channel, so subscribers
/// keep receiving fills from whichever agent is current.
pub struct PaperAgentFactory {
    feed: Arc<dyn MarketFeed>,
    decider: Arc<dyn DecisionEngine>,
    initial_cash: Decimal,
    trade_tx: broadcast::Sender<TradeRecord>,
}

impl PaperAgentFactory {
    pub fn new(feed: Arc<dyn MarketFeed>, initial_cash: Decimal) -> Self {
        let (trade_tx, _) = broadcast::channel(64);
        Self {
            feed,
            decider: Arc::new(MomentumDecider),
            initial_cash,
            trade_tx,
        }
    }

    /// Every filled order of every agent built here is published after it
    /// is recorded.
    pub fn subscribe_trades(&self) -> broadcast::Receiver<TradeRecord> {
        self.trade_tx.subscribe()
    }
}

impl AgentFactory for PaperAgentFactory {
    fn create(&self, credentials: &Credentials, settings: &Settings) -> anyhow::Result<Box<dyn Agent>> {
        settings
            .validate()
            .map_err(|errors| anyhow::anyhow!(errors.join(", ")))?;

        let mut settings = settings.clone();
        settings.target_coins = settings.target_coins.iter().map(|coin| coin_symbol(coin)).collect();

        info!(
            "Creating paper agent: model={}, interval={}m, max_investment={}, max_trades={}, risk={}, coins={:?}",
            settings.model,
            settings.interval_minutes,
            settings.max_investment,
            settings.max_trading_count,
            settings.risk_level,
            settings.target_coins
        );

        Ok(Box::new(PaperAgent::new(
            credentials.clone(),
            settings,
            Arc::clone(&self.feed),
            Arc::clone(&self.decider),
            self.initial_cash,
            self.trade_tx.clone(),
        )))
    }
}
