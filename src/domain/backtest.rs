//! Historical replay of the overnight-hold strategy.
//!
//! Each trading day the simulator first realizes the previous day's holdings
//! at that day's open, then re-derives the risk budget, rates the universe as
//! of the day and buys the new allocation at the close. Realizing before
//! rating keeps the next day's prices out of the sizing decision.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::domain::error::OvernighterError;
use crate::domain::rating::{rate, Rating, RatingParams};
use crate::domain::risk::tolerable_risk;
use crate::domain::sizing::{size, Allocation};
use crate::ports::market_data_port::MarketDataPort;

pub const DEFAULT_RISK_FRACTION: f64 = 0.10;
pub const DEFAULT_TEST_PERIODS: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestParams {
    pub rating: RatingParams,
    pub risk_fraction: f64,
    /// Venue timezone used to anchor each calendar day.
    pub timezone: Tz,
}

impl Default for BacktestParams {
    fn default() -> Self {
        BacktestParams {
            rating: RatingParams::default(),
            risk_fraction: DEFAULT_RISK_FRACTION,
            timezone: chrono_tz::America::New_York,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountState {
    pub cash: f64,
    pub risk_amount: f64,
}

/// One simulated trading day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayRecord {
    pub date: NaiveDate,
    /// Cash after realizing the overnight holdings.
    pub realized_cash: f64,
    pub risk_amount: f64,
    /// Cash after the day's purchases.
    pub closing_cash: f64,
    pub holdings: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub account: AccountState,
    pub days: Vec<DayRecord>,
}

/// Round to the smallest currency unit.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Midnight of `date` in `tz`, as UTC.
pub fn session_anchor(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, OvernighterError> {
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| OvernighterError::MarketData {
        reason: format!("invalid calendar date {}", date),
    })?;
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| OvernighterError::MarketData {
            reason: format!("no local midnight for {} in {}", date, tz),
        })
}

/// Value of `holdings` at the open of `date`.
///
/// A symbol without a bar on `date` contributes nothing.
fn realize_holdings(
    source: &dyn MarketDataPort,
    holdings: &Allocation,
    date: NaiveDate,
    params: &BacktestParams,
) -> Result<f64, OvernighterError> {
    if holdings.is_empty() {
        return Ok(0.0);
    }

    let anchor = session_anchor(date, params.timezone)?;
    let barset = source.get_bars(&holdings.symbols(), 1, Some(anchor))?;
    let mut total = 0.0;
    for (symbol, shares) in holdings.iter() {
        let opening = barset
            .get(symbol)
            .and_then(|bars| bars.last())
            .filter(|bar| bar.timestamp.with_timezone(&params.timezone).date_naive() == date);
        match opening {
            Some(bar) => total += shares * bar.open,
            None => warn!(
                %symbol,
                shares,
                %date,
                "no opening price, holding realized at zero"
            ),
        }
    }
    Ok(total)
}

/// Pay for the floored allocation at each rating's closing price.
///
/// Cash is rounded after every symbol so results match cent-level ledgers.
fn buy_allocation(ratings: &[Rating], target: &Allocation, mut cash: f64) -> f64 {
    for rating in ratings {
        let shares = target.get(&rating.symbol).unwrap_or(0.0).floor();
        let cost = round_cents(round_cents(rating.price) * shares);
        cash = round_cents(cash - cost);
    }
    cash
}

pub fn run_backtest(
    symbols: &[String],
    calendar: &[NaiveDate],
    initial_cash: f64,
    source: &dyn MarketDataPort,
    params: &BacktestParams,
) -> Result<BacktestResult, OvernighterError> {
    let mut account = AccountState {
        cash: initial_cash,
        risk_amount: tolerable_risk(initial_cash, params.risk_fraction),
    };
    let mut holdings = Allocation::new();
    let mut days = Vec::with_capacity(calendar.len());

    for (index, &date) in calendar.iter().enumerate() {
        let anchor = session_anchor(date, params.timezone)?;

        account.cash += realize_holdings(source, &holdings, date, params)?;
        holdings = Allocation::new();
        let realized_cash = account.cash;

        if index + 1 == calendar.len() {
            info!(%date, cash = account.cash, "end of backtest window");
            days.push(DayRecord {
                date,
                realized_cash,
                risk_amount: account.risk_amount,
                closing_cash: account.cash,
                holdings: 0,
            });
            break;
        }

        account.risk_amount = tolerable_risk(account.cash, params.risk_fraction);
        info!(
            %date,
            cash = account.cash,
            risk_amount = account.risk_amount,
            "cash account value"
        );

        let ratings = rate(symbols, source, &params.rating, Some(anchor))?;
        let target = size(&ratings, account.risk_amount);
        account.cash = buy_allocation(&ratings, &target, account.cash);
        holdings = target.whole_shares();

        days.push(DayRecord {
            date,
            realized_cash,
            risk_amount: account.risk_amount,
            closing_cash: account.cash,
            holdings: holdings.len(),
        });
    }

    Ok(BacktestResult { account, days })
}
