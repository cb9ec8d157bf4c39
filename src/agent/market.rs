use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::{MarketInfo, MarketQuote};

pub const QUOTE_CURRENCY: &str = "KRW";

/// Canonical instrument key: ` btc`, `KRW-BTC` and `krw-btc` all give `BTC`.
pub fn coin_symbol(coin: &str) -> String {
    let prefix = format!("{}-", QUOTE_CURRENCY);
    let upper = coin.trim().to_uppercase();
    upper.strip_prefix(&prefix).unwrap_or(&upper).to_string()
}

/// `BTC` -> `KRW-BTC`.
pub fn exchange_ticker(coin: &str) -> String {
    format!("{}-{}", QUOTE_CURRENCY, coin_symbol(coin))
}

/// How `collect_market_info` reads prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMode {
    /// A fresh quote, as used for trading decisions.
    Fresh,
    /// The latest known quote, for display.
    Peek,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyCandle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Connectivity check performed before an agent starts.
    async fn ping(&self) -> anyhow::Result<()>;

    async fn current_price(&self, ticker: &str) -> anyhow::Result<Decimal>;

    /// Latest known price without moving the feed. Feeds with no cache
    /// fall back to a fresh quote.
    async fn peek_price(&self, ticker: &str) -> anyhow::Result<Decimal> {
        self.current_price(ticker).await
    }

    /// Yesterday's and today's daily candles, oldest first.
    async fn daily_candles(&self, ticker: &str) -> anyhow::Result<Option<(DailyCandle, DailyCandle)>>;
}

/// Builds the instrument -> quote mapping for `coins`. Instruments whose
/// candles are unavailable are left out.
pub async fn collect_market_info(
    feed: &dyn MarketFeed,
    coins: &[String],
    mode: PriceMode,
) -> anyhow::Result<MarketInfo> {
    let mut info = MarketInfo::new();

    for coin in coins {
        let ticker = exchange_ticker(coin);
        let current_price = match mode {
            PriceMode::Fresh => feed.current_price(&ticker).await?,
            PriceMode::Peek => feed.peek_price(&ticker).await?,
        };

        let Some((previous, today)) = feed.daily_candles(&ticker).await? else {
            debug!("No daily candles for {}", ticker);
            continue;
        };

        let change_rate = if previous.close > Decimal::ZERO {
            ((current_price - previous.close) / previous.close * Decimal::from(100)).round_dp(2)
        } else {
            Decimal::ZERO
        };

        info.insert(
            coin_symbol(coin),
            MarketQuote {
                current_price,
                change_rate,
                open_price: today.open,
                high_price: today.high,
                low_price: today.low,
                volume: today.volume,
            },
        );
    }

    Ok(info)
}

struct SimulatedTicker {
    previous_close: Decimal,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    last: Decimal,
    volume: Decimal,
}

/// Deterministic random walk around a per-instrument base price. Each price
/// request advances the walk by one step of at most 1.5%.
pub struct SimulatedFeed {
    state: Mutex<SimulatedState>,
}

struct SimulatedState {
    rng: u64,
    tickers: HashMap<String, SimulatedTicker>,
}

impl SimulatedFeed {
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                // xorshift never leaves zero
                rng: seed.max(1),
                tickers: HashMap::new(),
            }),
        }
    }

    fn base_price(ticker: &str) -> Decimal {
        match ticker.trim_start_matches("KRW-") {
            "BTC" => Decimal::from(95_000_000),
            "ETH" => Decimal::from(4_800_000),
            "XRP" => Decimal::from(850),
            "SOL" => Decimal::from(210_000),
            "ADA" => Decimal::from(620),
            _ => Decimal::from(10_000),
        }
    }
}

impl SimulatedState {
    fn next_unit(&mut self) -> Decimal {
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 7;
        self.rng ^= self.rng << 17;
        // [-1, 1] in thousandths
        Decimal::new((self.rng % 2001) as i64 - 1000, 3)
    }

    fn ticker(&mut self, ticker: &str) -> &mut SimulatedTicker {
        let drift = if self.tickers.contains_key(ticker) {
            Decimal::ZERO
        } else {
            self.next_unit() * Decimal::new(3, 2)
        };

        self.tickers.entry(ticker.to_string()).or_insert_with(|| {
            let base = SimulatedFeed::base_price(ticker);
            let previous_close = (base * (Decimal::ONE - drift)).round_dp(0);
            SimulatedTicker {
                previous_close,
                open: previous_close,
                high: base.max(previous_close),
                low: base.min(previous_close),
                last: base,
                volume: Decimal::ZERO,
            }
        })
    }

    fn step(&mut self, ticker: &str) -> Decimal {
        let move_pct = self.next_unit() * Decimal::new(15, 3);
        let volume_unit = self.next_unit().abs();
        let state = self.ticker(ticker);

        let next = (state.last * (Decimal::ONE + move_pct)).round_dp(0).max(Decimal::ONE);
        state.last = next;
        state.high = state.high.max(next);
        state.low = state.low.min(next);
        state.volume += volume_unit * Decimal::from(100);
        next
    }
}

#[async_trait]
impl MarketFeed for SimulatedFeed {
    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn current_price(&self, ticker: &str) -> anyhow::Result<Decimal> {
        let mut state = self.state.lock().await;
        Ok(state.step(ticker))
    }

    async fn peek_price(&self, ticker: &str) -> anyhow::Result<Decimal> {
        let mut state = self.state.lock().await;
        Ok(state.ticker(ticker).last)
    }

    async fn daily_candles(&self, ticker: &str) -> anyhow::Result<Option<(DailyCandle, DailyCandle)>> {
        let mut state = self.state.lock().await;
        let sim = state.ticker(ticker);

        let previous = DailyCandle {
            open: sim.previous_close,
            high: sim.previous_close,
            low: sim.previous_close,
            close: sim.previous_close,
            volume: Decimal::ZERO,
        };
        let today = DailyCandle {
            open: sim.open,
            high: sim.high,
            low: sim.low,
            close: sim.last,
            volume: sim.volume,
        };
        Ok(Some((previous, today)))
    }
}
