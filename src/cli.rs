//! CLI definition and dispatch.

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::adapters::alpaca_adapter::AlpacaAdapter;
use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::thread_timer::ThreadTimer;
use crate::domain::backtest::{
    self as backtest_engine, BacktestParams, BacktestResult, DEFAULT_RISK_FRACTION,
    DEFAULT_TEST_PERIODS,
};
use crate::domain::config_validation::{
    parse_timezone, validate_backtest_config, validate_data_config, validate_live_config,
    validate_strategy_config, validate_universe_config,
};
use crate::domain::error::OvernighterError;
use crate::domain::live::{LiveParams, LiveTradingLoop, StopSignal};
use crate::domain::rating::{RatingParams, DEFAULT_BATCH_SIZE, DEFAULT_WINDOW_SIZE};
use crate::domain::universe::{AssetSelector, StaticUniverse};
use crate::ports::broker_port::BrokerPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;

#[derive(Parser, Debug)]
#[command(name = "overnighter", about = "Bullish-volume overnight-hold trader")]
pub struct Cli {
    #[arg(short, long)]
    pub config: PathBuf,
    /// Replay the strategy over recent trading days instead of trading live
    #[arg(long)]
    pub backtest: bool,
    /// Backtest lookback in calendar days
    #[arg(long = "testperiods")]
    pub test_periods: Option<i64>,
    /// Comma-separated symbols, overriding [universe] symbols
    #[arg(long)]
    pub symbols: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Alpaca,
    Csv(PathBuf),
}

/// Install the stderr log subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> ExitCode {
    let result = if cli.backtest {
        run_backtest(&cli)
    } else {
        run_live(&cli)
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, OvernighterError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), OvernighterError> {
    validate_data_config(config)?;
    validate_strategy_config(config)?;
    Ok(())
}

pub fn build_rating_params(config: &dyn ConfigPort) -> RatingParams {
    let max_holdings = config.get_int("strategy", "max_holdings", 0);
    RatingParams {
        window_size: config.get_int("strategy", "window_size", DEFAULT_WINDOW_SIZE as i64) as usize,
        max_holdings: (max_holdings > 0).then_some(max_holdings as usize),
        batch_size: config.get_int("strategy", "batch_size", DEFAULT_BATCH_SIZE as i64) as usize,
    }
}

pub fn build_timezone(config: &dyn ConfigPort) -> Result<Tz, OvernighterError> {
    match config.get_string("backtest", "timezone") {
        Some(name) => parse_timezone(&name),
        None => Ok(chrono_tz::America::New_York),
    }
}

pub fn build_backtest_params(config: &dyn ConfigPort) -> Result<BacktestParams, OvernighterError> {
    Ok(BacktestParams {
        rating: build_rating_params(config),
        risk_fraction: config.get_double("strategy", "risk_fraction", DEFAULT_RISK_FRACTION),
        timezone: build_timezone(config)?,
    })
}

pub fn build_live_params(config: &dyn ConfigPort) -> LiveParams {
    let defaults = LiveParams::default();
    LiveParams {
        rating: build_rating_params(config),
        poll_interval: std::time::Duration::from_secs(
            config.get_int("live", "poll_interval_secs", 30).max(1) as u64,
        ),
        sell_delay: Duration::seconds(config.get_int("live", "sell_delay_secs", 60)),
        buy_window: Duration::seconds(config.get_int("live", "buy_window_secs", 120)),
        order_lookback: Duration::hours(config.get_int("live", "order_lookback_hours", 24)),
        order_history_limit: config
            .get_int("live", "order_history_limit", defaults.order_history_limit as i64)
            as usize,
    }
}

pub fn build_data_source(config: &dyn ConfigPort) -> DataSource {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "alpaca".to_string());
    match (source.to_lowercase().as_str(), config.get_string("data", "csv_dir")) {
        ("csv", Some(dir)) => DataSource::Csv(PathBuf::from(dir)),
        _ => DataSource::Alpaca,
    }
}

/// Symbols from `--symbols`, falling back to `[universe] symbols`.
pub fn resolve_universe(
    symbols_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<StaticUniverse, OvernighterError> {
    match symbols_override {
        Some(list) => Ok(StaticUniverse::parse(list)?),
        None => {
            validate_universe_config(config)?;
            let list = config.get_string("universe", "symbols").unwrap_or_default();
            Ok(StaticUniverse::parse(&list)?)
        }
    }
}

pub fn resolve_test_periods(cli_value: Option<i64>, config: &dyn ConfigPort) -> Result<i64, OvernighterError> {
    let periods = cli_value.unwrap_or_else(|| config.get_int("backtest", "test_periods", DEFAULT_TEST_PERIODS));
    if periods < 1 {
        return Err(OvernighterError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "test_periods".to_string(),
            reason: "test_periods must be positive".to_string(),
        });
    }
    Ok(periods)
}

/// Starting cash: `[backtest] initial_cash` when set, otherwise the broker's cash.
pub fn resolve_initial_cash(
    config: &dyn ConfigPort,
    broker: Option<&dyn BrokerPort>,
) -> Result<f64, OvernighterError> {
    if config.get_string("backtest", "initial_cash").is_some() {
        return Ok(config.get_double("backtest", "initial_cash", 0.0));
    }
    broker.ok_or(OvernighterError::MissingBroker)?.cash()
}

fn run_backtest(cli: &Cli) -> Result<(), OvernighterError> {
    let config = load_config(&cli.config)?;
    validate_config(&config)?;
    validate_backtest_config(&config)?;

    let universe = resolve_universe(cli.symbols.as_deref(), &config)?;
    let test_periods = resolve_test_periods(cli.test_periods, &config)?;
    let params = build_backtest_params(&config)?;
    let today = Utc::now().with_timezone(&params.timezone).date_naive();

    let result = match build_data_source(&config) {
        DataSource::Alpaca => {
            let adapter = AlpacaAdapter::from_config(&config, params.timezone)?;
            let initial_cash = resolve_initial_cash(&config, Some(&adapter))?;
            run_backtest_pipeline(&adapter, universe.portfolio(), initial_cash, test_periods, today, &params)?
        }
        DataSource::Csv(dir) => {
            let adapter = CsvAdapter::new(dir, params.timezone);
            let initial_cash = resolve_initial_cash(&config, None)?;
            run_backtest_pipeline(&adapter, universe.portfolio(), initial_cash, test_periods, today, &params)?
        }
    };

    info!(
        final_cash = result.account.cash,
        days = result.days.len(),
        "backtest complete"
    );
    Ok(())
}

/// Replay the `test_periods` calendar days ending `today`.
pub fn run_backtest_pipeline(
    source: &dyn MarketDataPort,
    symbols: &[String],
    initial_cash: f64,
    test_periods: i64,
    today: NaiveDate,
    params: &BacktestParams,
) -> Result<BacktestResult, OvernighterError> {
    let beginning = today - Duration::days(test_periods);
    let calendar = source.get_calendar(beginning, today)?;

    info!(
        symbols = symbols.len(),
        trading_days = calendar.len(),
        %beginning,
        end = %today,
        initial_cash,
        "running backtest"
    );

    backtest_engine::run_backtest(symbols, &calendar, initial_cash, source, params)
}

fn run_live(cli: &Cli) -> Result<(), OvernighterError> {
    let config = load_config(&cli.config)?;
    validate_config(&config)?;
    validate_live_config(&config)?;

    let universe = resolve_universe(cli.symbols.as_deref(), &config)?;
    let timezone = build_timezone(&config)?;

    let adapter = match build_data_source(&config) {
        DataSource::Alpaca => AlpacaAdapter::from_config(&config, timezone)?,
        DataSource::Csv(_) => return Err(OvernighterError::MissingBroker),
    };

    let live = LiveTradingLoop {
        symbols: universe.portfolio(),
        market: &adapter,
        clock: &adapter,
        broker: &adapter,
        timer: &ThreadTimer,
        params: build_live_params(&config),
    };

    let state = live.recover(Utc::now())?;
    let stop = StopSignal::new();
    install_stop_handler(&stop)?;
    info!(symbols = universe.count(), "starting live trading loop");
    live.run(state, &stop);
    Ok(())
}

/// Raise `stop` on Ctrl-C; the loop then exits before its next poll.
pub fn install_stop_handler(stop: &StopSignal) -> Result<(), OvernighterError> {
    let handle = stop.clone();
    ctrlc::set_handler(move || {
        info!("interrupt received, stopping after the current poll");
        handle.stop();
    })
    .map_err(|e| OvernighterError::Io(std::io::Error::other(e)))
}
