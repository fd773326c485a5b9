//! CSV file market data adapter.
//!
//! Reads `<base_path>/<SYMBOL>.csv` files with a
//! `date,open,high,low,close,volume` header. Each bar is stamped at local
//! midnight of its date in the venue timezone. The trading calendar is the
//! sorted union of dates found across all files.

use crate::domain::error::OvernighterError;
use crate::domain::ohlcv::Bar;
use crate::ports::market_data_port::MarketDataPort;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub struct CsvAdapter {
    base_path: PathBuf,
    timezone: Tz,
    cache: RefCell<HashMap<String, Vec<Bar>>>,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf, timezone: Tz) -> Self {
        Self {
            base_path,
            timezone,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    fn stamp(&self, date: NaiveDate) -> Result<DateTime<Utc>, OvernighterError> {
        date.and_hms_opt(0, 0, 0)
            .and_then(|midnight| self.timezone.from_local_datetime(&midnight).earliest())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| OvernighterError::MarketData {
                reason: format!("no local midnight for {}", date),
            })
    }

    /// All bars for `symbol`, oldest first. `None` when there is no file.
    fn load(&self, symbol: &str) -> Result<Option<Vec<Bar>>, OvernighterError> {
        if let Some(bars) = self.cache.borrow().get(symbol) {
            return Ok(Some(bars.clone()));
        }

        let path = self.csv_path(symbol);
        if !path.exists() {
            debug!(%symbol, path = %path.display(), "no csv file");
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| OvernighterError::MarketData {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| OvernighterError::MarketData {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;

            let date_str = column(&record, 0, "date")?;
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                OvernighterError::MarketData {
                    reason: format!("invalid date format '{}': {}", date_str, e),
                }
            })?;

            bars.push(Bar {
                timestamp: self.stamp(date)?,
                open: number(&record, 1, "open")?,
                high: number(&record, 2, "high")?,
                low: number(&record, 3, "low")?,
                close: number(&record, 4, "close")?,
                volume: number(&record, 5, "volume")?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        self.cache
            .borrow_mut()
            .insert(symbol.to_string(), bars.clone());
        Ok(Some(bars))
    }

    fn list_symbols(&self) -> Result<Vec<String>, OvernighterError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| OvernighterError::MarketData {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| OvernighterError::MarketData {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            if let Some(symbol) = name.to_string_lossy().strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}

fn column<'r>(
    record: &'r csv::StringRecord,
    index: usize,
    name: &str,
) -> Result<&'r str, OvernighterError> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| OvernighterError::MarketData {
            reason: format!("missing {} column", name),
        })
}

fn number(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64, OvernighterError> {
    column(record, index, name)?
        .parse()
        .map_err(|e| OvernighterError::MarketData {
            reason: format!("invalid {} value: {}", name, e),
        })
}

impl MarketDataPort for CsvAdapter {
    fn get_bars(
        &self,
        symbols: &[String],
        limit: usize,
        end: Option<DateTime<Utc>>,
    ) -> Result<HashMap<String, Vec<Bar>>, OvernighterError> {
        let mut barset = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            let Some(bars) = self.load(symbol)? else {
                continue;
            };
            let upto = match end {
                Some(end) => bars.partition_point(|b| b.timestamp <= end),
                None => bars.len(),
            };
            let from = upto.saturating_sub(limit);
            barset.insert(symbol.clone(), bars[from..upto].to_vec());
        }
        Ok(barset)
    }

    fn get_calendar(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, OvernighterError> {
        let mut dates = BTreeSet::new();
        for symbol in self.list_symbols()? {
            if let Some(bars) = self.load(&symbol)? {
                dates.extend(
                    bars.iter()
                        .map(|b| b.timestamp.with_timezone(&self.timezone).date_naive())
                        .filter(|d| *d >= start && *d <= end),
                );
            }
        }
        Ok(dates.into_iter().collect())
    }
}
