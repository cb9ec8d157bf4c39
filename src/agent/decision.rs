use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use super::coin_symbol;
use crate::config::RiskLevel;
use crate::types::{MarketInfo, PriceType, Side, TradeAmount};

/// Everything a decision engine sees for one analysis cycle.
#[derive(Debug, Clone)]
pub struct DecisionContext<'a> {
    pub market: &'a MarketInfo,
    /// Units held per instrument (`BTC`, not `KRW-BTC`).
    pub holdings: &'a HashMap<String, Decimal>,
    pub cash: Decimal,
    pub max_investment: Decimal,
    pub risk_level: RiskLevel,
    pub remaining_trades: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub coin: String,
    pub side: Side,
    pub price_type: PriceType,
    pub amount: TradeAmount,
    pub limit_price: Option<Decimal>,
    pub reason: String,
}

pub trait DecisionEngine: Send + Sync {
    fn name(&self) -> &str;
    fn decide(&self, ctx: &DecisionContext<'_>) -> Vec<OrderIntent>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumThresholds {
    /// Minimum daily change (%) that triggers a buy.
    pub buy_above: Decimal,
    /// Daily change (%) at or below which a held position is sold.
    pub sell_below: Decimal,
    /// Fraction of max investment committed per buy.
    pub position_fraction: Decimal,
}

impl MomentumThresholds {
    pub fn for_risk(risk: RiskLevel) -> Self {
        match risk {
            RiskLevel::Conservative => Self {
                buy_above: dec!(3.0),
                sell_below: dec!(-2.0),
                position_fraction: dec!(0.20),
            },
            RiskLevel::Balanced => Self {
                buy_above: dec!(2.0),
                sell_below: dec!(-1.5),
                position_fraction: dec!(0.35),
            },
            RiskLevel::Aggressive => Self {
                buy_above: dec!(1.0),
                sell_below: dec!(-1.0),
                position_fraction: dec!(0.50),
            },
        }
    }
}

/// Rule-based stand-in for the model-driven decision: follow the daily
/// move, strongest movers first, never more orders than trades remaining.
#[derive(Debug, Default, Clone)]
pub struct MomentumDecider;

impl DecisionEngine for MomentumDecider {
    fn name(&self) -> &str {
        "momentum"
    }

    fn decide(&self, ctx: &DecisionContext<'_>) -> Vec<OrderIntent> {
        let thresholds = MomentumThresholds::for_risk(ctx.risk_level);

        let mut movers: Vec<_> = ctx.market.iter().collect();
        movers.sort_by(|a, b| b.1.change_rate.abs().cmp(&a.1.change_rate.abs()));

        let mut intents = Vec::new();
        let mut budget = ctx.cash;

        for (coin, quote) in movers {
            if intents.len() as u32 >= ctx.remaining_trades {
                break;
            }

            let held = ctx.holdings.get(&coin_symbol(coin)).copied().unwrap_or(Decimal::ZERO);

            if quote.change_rate <= thresholds.sell_below && held > Decimal::ZERO {
                intents.push(OrderIntent {
                    coin: coin.clone(),
                    side: Side::Sell,
                    price_type: PriceType::Market,
                    amount: TradeAmount::All,
                    limit_price: None,
                    reason: format!(
                        "{} fell {}% today ({} risk exit threshold {}%)",
                        coin, quote.change_rate, ctx.risk_level, thresholds.sell_below
                    ),
                });
            } else if quote.change_rate >= thresholds.buy_above && held.is_zero() {
                let size = (ctx.max_investment * thresholds.position_fraction).round_dp(0);
                if size.is_zero() || budget < size {
                    continue;
                }
                budget -= size;
                intents.push(OrderIntent {
                    coin: coin.clone(),
                    side: Side::Buy,
                    price_type: PriceType::Market,
                    amount: TradeAmount::Quote(size),
                    limit_price: None,
                    reason: format!(
                        "{} rose {}% today, above the {} entry threshold of {}%",
                        coin, quote.change_rate, ctx.risk_level, thresholds.buy_above
                    ),
                });
            }
        }

        intents
    }
}
