//! Alpaca REST adapter: market data, market clock and brokerage.
//!
//! Uses the blocking `reqwest` client. API keys come from the `[alpaca]`
//! config section or the `APCA_API_KEY_ID` / `APCA_API_SECRET_KEY`
//! environment variables and are held as [`SecretString`].

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{header, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::domain::error::OvernighterError;
use crate::domain::market::{MarketClock, OrderHistory, OrderRecord, OrderRequest, OrderSide};
use crate::domain::ohlcv::Bar;
use crate::ports::broker_port::BrokerPort;
use crate::ports::clock_port::ClockPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;

pub const PAPER_TRADING_URL: &str = "https://paper-api.alpaca.markets";
pub const LIVE_TRADING_URL: &str = "https://api.alpaca.markets";
pub const DATA_URL: &str = "https://data.alpaca.markets";

const KEY_ID_ENV: &str = "APCA_API_KEY_ID";
const SECRET_KEY_ENV: &str = "APCA_API_SECRET_KEY";
const MAX_PAGE_SIZE: usize = 10_000;

pub struct AlpacaAdapter {
    client: Client,
    trading_url: String,
    data_url: String,
    timezone: Tz,
    _key_id: SecretString,
    _secret_key: SecretString,
}

#[derive(Debug, Clone, Copy)]
enum Api {
    Data,
    Trading,
}

fn api_error(api: Api, reason: String) -> OvernighterError {
    match api {
        Api::Data => OvernighterError::MarketData { reason },
        Api::Trading => OvernighterError::Broker { reason },
    }
}

impl AlpacaAdapter {
    pub fn new(
        key_id: SecretString,
        secret_key: SecretString,
        trading_url: &str,
        data_url: &str,
        timezone: Tz,
    ) -> Result<Self, OvernighterError> {
        let header_value = |value: &SecretString, key: &str| {
            header::HeaderValue::from_str(value.expose_secret()).map_err(|_| {
                OvernighterError::ConfigInvalid {
                    section: "alpaca".to_string(),
                    key: key.to_string(),
                    reason: "contains characters not allowed in a header".to_string(),
                }
            })
        };

        let mut headers = header::HeaderMap::new();
        headers.insert("apca-api-key-id", header_value(&key_id, "key_id")?);
        headers.insert("apca-api-secret-key", header_value(&secret_key, "secret_key")?);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| OvernighterError::Broker {
                reason: format!("failed to build http client: {}", e),
            })?;

        Ok(Self {
            client,
            trading_url: trading_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
            timezone,
            _key_id: key_id,
            _secret_key: secret_key,
        })
    }

    pub fn from_config(config: &dyn ConfigPort, timezone: Tz) -> Result<Self, OvernighterError> {
        let key_id = credential(config, "key_id", KEY_ID_ENV)?;
        let secret_key = credential(config, "secret_key", SECRET_KEY_ENV)?;

        let default_trading = if config.get_bool("alpaca", "paper", true) {
            PAPER_TRADING_URL
        } else {
            LIVE_TRADING_URL
        };
        let trading_url = config
            .get_string("alpaca", "trading_url")
            .unwrap_or_else(|| default_trading.to_string());
        let data_url = config
            .get_string("alpaca", "data_url")
            .unwrap_or_else(|| DATA_URL.to_string());

        Self::new(key_id, secret_key, &trading_url, &data_url, timezone)
    }

    fn send(&self, api: Api, request: RequestBuilder) -> Result<Response, OvernighterError> {
        let response = request.send().map_err(|e| api_error(api, e.to_string()))?;
        check_status(api, response)
    }

    fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        api: Api,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, OvernighterError> {
        self.send(api, self.client.get(url).query(query))?
            .json::<T>()
            .map_err(|e| api_error(api, format!("unexpected response from {}: {}", url, e)))
    }

    /// Open of the session on `clock`'s date, from the trading calendar.
    fn session_open(&self, clock: &ClockResponse) -> Result<Option<DateTime<Utc>>, OvernighterError> {
        if !clock.is_open {
            return Ok(None);
        }
        let today = clock.timestamp.with_timezone(&self.timezone).date_naive();
        let days = self.calendar_days(Api::Trading, today, today)?;
        Ok(days
            .iter()
            .find(|d| d.date == today)
            .and_then(|d| local_session_time(d.date, &d.open, self.timezone)))
    }

    fn calendar_days(
        &self,
        api: Api,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CalendarDay>, OvernighterError> {
        let url = format!("{}/v2/calendar", self.trading_url);
        self.get_json(
            api,
            &url,
            &[
                ("start", start.format("%Y-%m-%d").to_string()),
                ("end", end.format("%Y-%m-%d").to_string()),
            ],
        )
    }
}

fn credential(
    config: &dyn ConfigPort,
    key: &str,
    env: &str,
) -> Result<SecretString, OvernighterError> {
    config
        .get_string("alpaca", key)
        .or_else(|| std::env::var(env).ok().filter(|v| !v.trim().is_empty()))
        .map(|v| SecretString::new(v.into()))
        .ok_or_else(|| OvernighterError::ConfigMissing {
            section: "alpaca".to_string(),
            key: key.to_string(),
        })
}

fn check_status(api: Api, response: Response) -> Result<Response, OvernighterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|_| "Unknown API error".to_string());
    Err(api_error(api, format!("{}: {}", status, body)))
}

fn local_session_time(date: NaiveDate, hhmm: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let time = NaiveTime::parse_from_str(hhmm, "%H:%M").ok()?;
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Keep the newest `limit` bars, oldest first.
fn keep_last(mut bars: Vec<Bar>, limit: usize) -> Vec<Bar> {
    bars.sort_by_key(|b| b.timestamp);
    let from = bars.len().saturating_sub(limit);
    bars.split_off(from)
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    bars: Option<HashMap<String, Vec<AlpacaBar>>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
}

impl From<AlpacaBar> for Bar {
    fn from(ab: AlpacaBar) -> Self {
        Bar {
            timestamp: ab.timestamp,
            open: ab.open,
            high: ab.high,
            low: ab.low,
            close: ab.close,
            volume: ab.volume,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CalendarDay {
    date: NaiveDate,
    open: String,
}

#[derive(Debug, Deserialize)]
struct ClockResponse {
    timestamp: DateTime<Utc>,
    is_open: bool,
    next_open: DateTime<Utc>,
    next_close: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    cash: String,
}

#[derive(Debug, Deserialize)]
struct AlpacaOrder {
    symbol: String,
    side: String,
    submitted_at: Option<DateTime<Utc>>,
}

impl From<AlpacaOrder> for OrderRecord {
    fn from(order: AlpacaOrder) -> Self {
        let side = if order.side.eq_ignore_ascii_case("buy") {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        OrderRecord {
            symbol: order.symbol,
            side,
            submitted_at: order.submitted_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct OrderBody<'a> {
    symbol: &'a str,
    qty: String,
    side: &'a str,
    #[serde(rename = "type")]
    order_type: &'a str,
    time_in_force: &'a str,
}

impl<'a> From<&'a OrderRequest> for OrderBody<'a> {
    fn from(order: &'a OrderRequest) -> Self {
        OrderBody {
            symbol: &order.symbol,
            qty: order.qty.to_string(),
            side: order.side.as_str(),
            order_type: order.order_type.as_str(),
            time_in_force: order.time_in_force.as_str(),
        }
    }
}

impl MarketDataPort for AlpacaAdapter {
    fn get_bars(
        &self,
        symbols: &[String],
        limit: usize,
        end: Option<DateTime<Utc>>,
    ) -> Result<HashMap<String, Vec<Bar>>, OvernighterError> {
        let url = format!("{}/v2/stocks/bars", self.data_url);
        let end = end.unwrap_or_else(Utc::now);
        // Enough calendar days to cover `limit` sessions across weekends and holidays.
        let start = end - Duration::days(limit as i64 * 2 + 10);

        let mut collected: HashMap<String, Vec<Bar>> = HashMap::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("symbols", symbols.join(",")),
                ("timeframe", "1Day".to_string()),
                ("start", start.to_rfc3339()),
                ("end", end.to_rfc3339()),
                ("limit", MAX_PAGE_SIZE.to_string()),
                ("adjustment", "raw".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let page: BarsResponse = self.get_json(Api::Data, &url, &query)?;
            for (symbol, bars) in page.bars.unwrap_or_default() {
                collected
                    .entry(symbol)
                    .or_default()
                    .extend(bars.into_iter().map(Bar::from));
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(symbols = symbols.len(), returned = collected.len(), "fetched bars");
        Ok(collected
            .into_iter()
            .map(|(symbol, bars)| (symbol, keep_last(bars, limit)))
            .collect())
    }

    fn get_calendar(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, OvernighterError> {
        let mut dates: Vec<NaiveDate> = self
            .calendar_days(Api::Data, start, end)?
            .into_iter()
            .map(|d| d.date)
            .collect();
        dates.sort();
        Ok(dates)
    }
}

impl ClockPort for AlpacaAdapter {
    fn get_clock(&self) -> Result<MarketClock, OvernighterError> {
        let url = format!("{}/v2/clock", self.trading_url);
        let clock: ClockResponse = self.get_json(Api::Trading, &url, &[])?;
        let session_open = self.session_open(&clock)?;
        Ok(MarketClock {
            is_open: clock.is_open,
            timestamp: clock.timestamp,
            next_open: clock.next_open,
            next_close: clock.next_close,
            session_open,
        })
    }
}

impl BrokerPort for AlpacaAdapter {
    fn cash(&self) -> Result<f64, OvernighterError> {
        let url = format!("{}/v2/account", self.trading_url);
        let account: AccountResponse = self.get_json(Api::Trading, &url, &[])?;
        account
            .cash
            .parse()
            .map_err(|e| OvernighterError::Broker {
                reason: format!("invalid account cash '{}': {}", account.cash, e),
            })
    }

    fn list_orders(
        &self,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<OrderHistory, OvernighterError> {
        let url = format!("{}/v2/orders", self.trading_url);
        let query = [
            ("status", "all".to_string()),
            ("after", after.to_rfc3339()),
            ("limit", limit.to_string()),
        ];
        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .map_err(|e| api_error(Api::Trading, e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(OrderHistory::NoOrders);
        }
        let orders: Vec<AlpacaOrder> = check_status(Api::Trading, response)?
            .json()
            .map_err(|e| api_error(Api::Trading, format!("unexpected order list: {}", e)))?;

        if orders.is_empty() {
            return Ok(OrderHistory::NoOrders);
        }
        Ok(OrderHistory::Orders(
            orders.into_iter().map(OrderRecord::from).collect(),
        ))
    }

    fn submit_order(&self, order: &OrderRequest) -> Result<(), OvernighterError> {
        let url = format!("{}/v2/orders", self.trading_url);
        self.send(Api::Trading, self.client.post(&url).json(&OrderBody::from(order)))?;
        Ok(())
    }

    fn close_all_positions(&self) -> Result<(), OvernighterError> {
        let url = format!("{}/v2/positions", self.trading_url);
        self.send(Api::Trading, self.client.delete(&url))?;
        Ok(())
    }
}
