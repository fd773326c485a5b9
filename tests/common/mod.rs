#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, Utc};
use overnighter::domain::backtest::session_anchor;
use overnighter::domain::error::OvernighterError;
use overnighter::domain::market::{MarketClock, OrderHistory, OrderRequest};
pub use overnighter::domain::ohlcv::Bar;
use overnighter::domain::live::StopSignal;
use overnighter::ports::broker_port::BrokerPort;
use overnighter::ports::clock_port::ClockPort;
use overnighter::ports::market_data_port::MarketDataPort;
use overnighter::ports::timer_port::TimerPort;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

pub const NY: chrono_tz::Tz = chrono_tz::America::New_York;

pub struct MockMarketData {
    pub data: HashMap<String, Vec<Bar>>,
    pub calendar: Vec<NaiveDate>,
    pub error: Option<String>,
    pub requests: RefCell<Vec<(Vec<String>, usize, Option<DateTime<Utc>>)>>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            calendar: Vec::new(),
            error: None,
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_calendar(mut self, calendar: Vec<NaiveDate>) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }
}

impl MarketDataPort for MockMarketData {
    fn get_bars(
        &self,
        symbols: &[String],
        limit: usize,
        end: Option<DateTime<Utc>>,
    ) -> Result<HashMap<String, Vec<Bar>>, OvernighterError> {
        self.requests
            .borrow_mut()
            .push((symbols.to_vec(), limit, end));
        if let Some(reason) = &self.error {
            return Err(OvernighterError::MarketData {
                reason: reason.clone(),
            });
        }
        let mut barset = HashMap::new();
        for symbol in symbols {
            if let Some(bars) = self.data.get(symbol) {
                let eligible: Vec<Bar> = bars
                    .iter()
                    .filter(|b| end.is_none_or(|e| b.timestamp <= e))
                    .cloned()
                    .collect();
                let from = eligible.len().saturating_sub(limit);
                barset.insert(symbol.clone(), eligible[from..].to_vec());
            }
        }
        Ok(barset)
    }

    fn get_calendar(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, OvernighterError> {
        Ok(self
            .calendar
            .iter()
            .copied()
            .filter(|d| *d >= start && *d <= end)
            .collect())
    }
}

pub struct MockBroker {
    pub cash: f64,
    pub cash_error: bool,
    pub history: OrderHistory,
    pub history_error: bool,
    pub failing_symbols: HashSet<String>,
    pub close_error: bool,
    pub submitted: RefCell<Vec<OrderRequest>>,
    pub closes: Cell<usize>,
    pub history_requests: RefCell<Vec<(DateTime<Utc>, usize)>>,
}

impl MockBroker {
    pub fn new(cash: f64) -> Self {
        Self {
            cash,
            cash_error: false,
            history: OrderHistory::NoOrders,
            history_error: false,
            failing_symbols: HashSet::new(),
            close_error: false,
            submitted: RefCell::new(Vec::new()),
            closes: Cell::new(0),
            history_requests: RefCell::new(Vec::new()),
        }
    }

    pub fn with_history(mut self, history: OrderHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_failing_symbol(mut self, symbol: &str) -> Self {
        self.failing_symbols.insert(symbol.to_string());
        self
    }

    pub fn submitted_symbols(&self) -> Vec<String> {
        self.submitted
            .borrow()
            .iter()
            .map(|o| o.symbol.clone())
            .collect()
    }
}

fn broker_error(reason: &str) -> OvernighterError {
    OvernighterError::Broker {
        reason: reason.to_string(),
    }
}

impl BrokerPort for MockBroker {
    fn cash(&self) -> Result<f64, OvernighterError> {
        if self.cash_error {
            return Err(broker_error("account unavailable"));
        }
        Ok(self.cash)
    }

    fn list_orders(
        &self,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<OrderHistory, OvernighterError> {
        self.history_requests.borrow_mut().push((after, limit));
        if self.history_error {
            return Err(broker_error("connection refused"));
        }
        Ok(self.history.clone())
    }

    fn submit_order(&self, order: &OrderRequest) -> Result<(), OvernighterError> {
        if self.failing_symbols.contains(&order.symbol) {
            return Err(broker_error("insufficient buying power"));
        }
        self.submitted.borrow_mut().push(order.clone());
        Ok(())
    }

    fn close_all_positions(&self) -> Result<(), OvernighterError> {
        self.closes.set(self.closes.get() + 1);
        if self.close_error {
            return Err(broker_error("liquidation rejected"));
        }
        Ok(())
    }
}

/// Replays clocks in order, repeating the last one once exhausted.
pub struct ScriptedClock {
    clocks: RefCell<VecDeque<MarketClock>>,
    last: RefCell<Option<MarketClock>>,
    pub calls: Cell<usize>,
}

impl ScriptedClock {
    pub fn new(clocks: Vec<MarketClock>) -> Self {
        Self {
            clocks: RefCell::new(clocks.into()),
            last: RefCell::new(None),
            calls: Cell::new(0),
        }
    }
}

impl ClockPort for ScriptedClock {
    fn get_clock(&self) -> Result<MarketClock, OvernighterError> {
        self.calls.set(self.calls.get() + 1);
        if let Some(clock) = self.clocks.borrow_mut().pop_front() {
            *self.last.borrow_mut() = Some(clock.clone());
            return Ok(clock);
        }
        self.last
            .borrow()
            .clone()
            .ok_or_else(|| OvernighterError::MarketData {
                reason: "no clock scripted".to_string(),
            })
    }
}

/// Raises `stop` after `limit` sleeps.
pub struct StoppingTimer {
    pub stop: StopSignal,
    pub limit: usize,
    pub sleeps: Cell<usize>,
}

impl StoppingTimer {
    pub fn new(stop: StopSignal, limit: usize) -> Self {
        Self {
            stop,
            limit,
            sleeps: Cell::new(0),
        }
    }
}

impl TimerPort for StoppingTimer {
    fn sleep(&self, _duration: std::time::Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
        if self.sleeps.get() >= self.limit {
            self.stop.stop();
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    use chrono::TimeZone;
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Consecutive daily bars from `start`, stamped at New York midnight.
///
/// Each tuple is `(open, close, volume)`.
pub fn daily_bars(start: NaiveDate, rows: &[(f64, f64, f64)]) -> Vec<Bar> {
    rows.iter()
        .enumerate()
        .map(|(i, &(open, close, volume))| Bar {
            timestamp: session_anchor(start + Duration::days(i as i64), NY).unwrap(),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume,
        })
        .collect()
}

/// Clock for a session opening 14:30 UTC and closing 21:00 UTC on `day`.
pub fn open_clock(day: NaiveDate, h: u32, m: u32) -> MarketClock {
    let at = |h: u32, m: u32| day.and_hms_opt(h, m, 0).unwrap().and_utc();
    MarketClock {
        is_open: true,
        timestamp: at(h, m),
        next_open: at(14, 30) + Duration::days(1),
        next_close: at(21, 0),
        session_open: Some(at(14, 30)),
    }
}

pub fn closed_clock(day: NaiveDate) -> MarketClock {
    let at = |h: u32, m: u32| day.and_hms_opt(h, m, 0).unwrap().and_utc();
    MarketClock {
        is_open: false,
        timestamp: at(22, 0),
        next_open: at(14, 30) + Duration::days(1),
        next_close: at(21, 0) + Duration::days(1),
        session_open: None,
    }
}
