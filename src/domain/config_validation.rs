//! Configuration validation.
//!
//! Validates all config fields before either driver runs.

use crate::domain::error::OvernighterError;
use crate::domain::rating::MIN_WINDOW_SIZE;
use crate::domain::universe::parse_symbols;
use crate::ports::config_port::ConfigPort;
use chrono_tz::Tz;

pub const DATA_SOURCES: &[&str] = &["alpaca", "csv"];

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), OvernighterError> {
    validate_window_size(config)?;
    validate_risk_fraction(config)?;
    validate_non_negative_int(config, "strategy", "max_holdings", 0)?;
    validate_positive_int(config, "strategy", "batch_size", 200)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), OvernighterError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "alpaca".to_string())
        .to_lowercase();
    if !DATA_SOURCES.contains(&source.as_str()) {
        return Err(invalid(
            "data",
            "source",
            format!("unknown data source '{}', expected one of: alpaca, csv", source),
        ));
    }
    if source == "csv" {
        match config.get_string("data", "csv_dir") {
            Some(dir) if !dir.trim().is_empty() => {}
            _ => {
                return Err(OvernighterError::ConfigMissing {
                    section: "data".to_string(),
                    key: "csv_dir".to_string(),
                })
            }
        }
    }
    Ok(())
}

pub fn validate_universe_config(config: &dyn ConfigPort) -> Result<(), OvernighterError> {
    let symbols = config
        .get_string("universe", "symbols")
        .ok_or_else(|| OvernighterError::ConfigMissing {
            section: "universe".to_string(),
            key: "symbols".to_string(),
        })?;
    parse_symbols(&symbols)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), OvernighterError> {
    validate_positive_int(config, "backtest", "test_periods", 30)?;

    if let Some(cash) = parsed_float(config, "backtest", "initial_cash")? {
        if cash <= 0.0 {
            return Err(invalid(
                "backtest",
                "initial_cash",
                "initial_cash must be positive".to_string(),
            ));
        }
    }

    if let Some(tz) = config.get_string("backtest", "timezone") {
        parse_timezone(&tz)?;
    }
    Ok(())
}

pub fn validate_live_config(config: &dyn ConfigPort) -> Result<(), OvernighterError> {
    validate_positive_int(config, "live", "poll_interval_secs", 30)?;
    validate_non_negative_int(config, "live", "sell_delay_secs", 60)?;
    validate_non_negative_int(config, "live", "buy_window_secs", 120)?;
    validate_positive_int(config, "live", "order_lookback_hours", 24)?;
    validate_positive_int(config, "live", "order_history_limit", 400)?;
    Ok(())
}

pub fn parse_timezone(name: &str) -> Result<Tz, OvernighterError> {
    name.trim().parse::<Tz>().map_err(|_| {
        invalid(
            "backtest",
            "timezone",
            format!("unknown timezone '{}'", name.trim()),
        )
    })
}

fn validate_window_size(config: &dyn ConfigPort) -> Result<(), OvernighterError> {
    let value = parsed_int(config, "strategy", "window_size")?.unwrap_or(10);
    if value < MIN_WINDOW_SIZE as i64 {
        return Err(invalid(
            "strategy",
            "window_size",
            format!("window_size must be at least {}", MIN_WINDOW_SIZE),
        ));
    }
    Ok(())
}

fn validate_risk_fraction(config: &dyn ConfigPort) -> Result<(), OvernighterError> {
    let value = parsed_float(config, "strategy", "risk_fraction")?.unwrap_or(0.10);
    if value <= 0.0 || value > 1.0 {
        return Err(invalid(
            "strategy",
            "risk_fraction",
            "risk_fraction must be in (0, 1]".to_string(),
        ));
    }
    Ok(())
}

fn validate_positive_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<(), OvernighterError> {
    if parsed_int(config, section, key)?.unwrap_or(default) < 1 {
        return Err(invalid(section, key, format!("{} must be positive", key)));
    }
    Ok(())
}

fn validate_non_negative_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<(), OvernighterError> {
    if parsed_int(config, section, key)?.unwrap_or(default) < 0 {
        return Err(invalid(section, key, format!("{} must be non-negative", key)));
    }
    Ok(())
}

/// The value at `key`, if set; a value that does not parse is an error.
fn parsed_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<i64>, OvernighterError> {
    config
        .get_string(section, key)
        .map(|raw| {
            raw.parse::<i64>()
                .map_err(|_| invalid(section, key, format!("expected an integer, got '{}'", raw)))
        })
        .transpose()
}

fn parsed_float(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, OvernighterError> {
    config
        .get_string(section, key)
        .map(|raw| match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(invalid(section, key, format!("expected a number, got '{}'", raw))),
        })
        .transpose()
}

fn invalid(section: &str, key: &str, reason: String) -> OvernighterError {
    OvernighterError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    }
}
