//! Market clock and order types shared by the live loop and broker adapters.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Snapshot of the venue clock.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketClock {
    pub is_open: bool,
    pub timestamp: DateTime<Utc>,
    pub next_open: DateTime<Utc>,
    pub next_close: DateTime<Utc>,
    /// Open of the current session, when the source knows it.
    pub session_open: Option<DateTime<Utc>>,
}

impl MarketClock {
    /// Time elapsed since the current session opened.
    ///
    /// `None` when the market is closed or the session open is unknown.
    pub fn time_since_open(&self) -> Option<Duration> {
        if !self.is_open {
            return None;
        }
        self.session_open.map(|open| self.timestamp - open)
    }

    pub fn time_until_close(&self) -> Duration {
        self.next_close - self.timestamp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Day,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Day => "day",
        }
    }
}

/// An order the loop wants the broker to place.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub qty: u64,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    pub fn market_buy(symbol: &str, qty: u64) -> Self {
        OrderRequest {
            symbol: symbol.to_string(),
            qty,
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
        }
    }
}

/// An order previously seen by the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub symbol: String,
    pub side: OrderSide,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Outcome of an order-history lookup that reached the broker.
///
/// Transport failures are reported through the surrounding `Result`.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderHistory {
    Orders(Vec<OrderRecord>),
    NoOrders,
}

impl OrderHistory {
    pub fn orders(&self) -> &[OrderRecord] {
        match self {
            OrderHistory::Orders(orders) => orders,
            OrderHistory::NoOrders => &[],
        }
    }
}
