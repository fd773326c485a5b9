//! Live day-phase state machine.
//!
//! The loop polls the market clock on a fixed interval. Shortly after the
//! open it liquidates everything held overnight; shortly before the close it
//! rates the universe and buys the new allocation with the account's cash.
//! Progress through the day is tracked in [`TradingDayState`], which resets
//! whenever the clock reports the market closed.
//!
//! | clock                         | state            | phase         |
//! |-------------------------------|------------------|---------------|
//! | closed                        | any              | MarketClosed  |
//! | open                          | bought           | Done          |
//! | open, before `sell_delay`     | not sold         | AwaitingSell  |
//! | open, after `sell_delay`      | not sold         | Liquidate     |
//! | open, outside `buy_window`    | sold             | AwaitingBuy   |
//! | open, inside `buy_window`     | sold             | Buy           |

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::error::OvernighterError;
use crate::domain::market::{MarketClock, OrderHistory, OrderRequest, OrderSide};
use crate::domain::rating::{rate, RatingParams};
use crate::domain::sizing::size;
use crate::ports::broker_port::BrokerPort;
use crate::ports::clock_port::ClockPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::timer_port::TimerPort;

/// Closed-market polls between "waiting" log lines.
const WAITING_LOG_EVERY: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct LiveParams {
    pub rating: RatingParams,
    pub poll_interval: std::time::Duration,
    /// Time after the open before liquidating.
    pub sell_delay: Duration,
    /// Time before the close at which buying starts.
    pub buy_window: Duration,
    pub order_lookback: Duration,
    pub order_history_limit: usize,
}

impl Default for LiveParams {
    fn default() -> Self {
        LiveParams {
            rating: RatingParams::default(),
            poll_interval: std::time::Duration::from_secs(30),
            sell_delay: Duration::seconds(60),
            buy_window: Duration::seconds(120),
            order_lookback: Duration::hours(24),
            order_history_limit: 400,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradingDayState {
    pub bought_today: bool,
    pub sold_today: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    MarketClosed,
    AwaitingSell,
    Liquidate,
    AwaitingBuy,
    Buy,
    Done,
}

/// Next state and the action to take for one poll.
pub fn step(
    state: TradingDayState,
    clock: &MarketClock,
    params: &LiveParams,
) -> (TradingDayState, Phase) {
    if !clock.is_open {
        return (TradingDayState::default(), Phase::MarketClosed);
    }
    if state.bought_today {
        return (state, Phase::Done);
    }
    if !state.sold_today {
        let past_delay = clock
            .time_since_open()
            .is_none_or(|elapsed| elapsed >= params.sell_delay);
        if !past_delay {
            return (state, Phase::AwaitingSell);
        }
        let next = TradingDayState {
            sold_today: true,
            ..state
        };
        return (next, Phase::Liquidate);
    }
    if clock.time_until_close() > params.buy_window {
        return (state, Phase::AwaitingBuy);
    }
    let next = TradingDayState {
        bought_today: true,
        sold_today: true,
    };
    (next, Phase::Buy)
}

/// Rebuild the day flags from recent order history.
///
/// A buy implies the day's sell already happened, even when the sell record
/// is missing.
pub fn recover_state(history: &OrderHistory) -> TradingDayState {
    let orders = history.orders();
    if orders.iter().any(|o| o.side == OrderSide::Buy) {
        return TradingDayState {
            bought_today: true,
            sold_today: true,
        };
    }
    TradingDayState {
        bought_today: false,
        sold_today: !orders.is_empty(),
    }
}

/// Cooperative cancellation flag, checked between polls.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderSummary {
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct LiveTradingLoop<'a> {
    pub symbols: &'a [String],
    pub market: &'a dyn MarketDataPort,
    pub clock: &'a dyn ClockPort,
    pub broker: &'a dyn BrokerPort,
    pub timer: &'a dyn TimerPort,
    pub params: LiveParams,
}

impl<'a> LiveTradingLoop<'a> {
    /// Day flags implied by the broker's order history before `now`.
    ///
    /// Only a transport failure is an error; an empty history is a fresh day.
    pub fn recover(&self, now: DateTime<Utc>) -> Result<TradingDayState, OvernighterError> {
        let after = now - self.params.order_lookback;
        let history = self
            .broker
            .list_orders(after, self.params.order_history_limit)?;
        let state = recover_state(&history);
        info!(
            orders = history.orders().len(),
            bought_today = state.bought_today,
            sold_today = state.sold_today,
            "recovered trading day state"
        );
        Ok(state)
    }

    /// Poll once: read the clock, transition, act.
    pub fn poll(&self, state: TradingDayState, cycle: u64) -> TradingDayState {
        let clock = match self.clock.get_clock() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "clock unavailable, skipping poll");
                return state;
            }
        };

        let (next, phase) = step(state, &clock, &self.params);
        match phase {
            Phase::MarketClosed => {
                if cycle % WAITING_LOG_EVERY == 0 {
                    info!("waiting for next market day");
                }
            }
            Phase::Liquidate => self.liquidate(),
            Phase::Buy => {
                self.buy();
            }
            Phase::AwaitingSell | Phase::AwaitingBuy | Phase::Done => {}
        }
        next
    }

    /// Poll until `stop` is raised, sleeping `poll_interval` between polls.
    pub fn run(&self, initial: TradingDayState, stop: &StopSignal) -> TradingDayState {
        let mut state = initial;
        let mut cycle: u64 = 0;
        while !stop.is_stopped() {
            state = self.poll(state, cycle);
            self.timer.sleep(self.params.poll_interval);
            cycle += 1;
        }
        info!("live loop stopped");
        state
    }

    fn liquidate(&self) {
        info!("liquidating positions");
        if let Err(e) = self.broker.close_all_positions() {
            warn!(error = %e, "liquidation failed");
        }
    }

    /// Rate the universe and submit one market buy per allocated symbol.
    pub fn buy(&self) -> OrderSummary {
        info!("buying positions");
        let mut summary = OrderSummary::default();

        let cash = match self.broker.cash() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "could not read account cash, no orders placed");
                return summary;
            }
        };
        let ratings = match rate(self.symbols, self.market, &self.params.rating, None) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "rating failed, no orders placed");
                return summary;
            }
        };

        for (symbol, shares) in size(&ratings, cash).iter() {
            let qty = shares.floor() as u64;
            if qty == 0 {
                summary.skipped += 1;
                continue;
            }
            match self.broker.submit_order(&OrderRequest::market_buy(symbol, qty)) {
                Ok(()) => summary.submitted += 1,
                Err(e) => {
                    warn!(%symbol, qty, error = %e, "order submission failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            submitted = summary.submitted,
            skipped = summary.skipped,
            failed = summary.failed,
            "positions bought"
        );
        summary
    }
}
