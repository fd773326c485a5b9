//! Bullish-volume rating engine.
//!
//! A symbol's rating is its window momentum (relative close-to-close change)
//! multiplied by how many standard deviations the latest volume jump is away
//! from the preceding volumes:
//!
//! ```text
//! rating = (close[n-1] - close[0]) / close[0]
//!        * (volume[n-1] - volume[n-2]) / stdev(volume[0..n-1])
//! ```
//!
//! Incomplete, stale or degenerate windows are excluded silently (logged at
//! debug level), and only positive ratings are kept.

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::debug;

use crate::domain::error::OvernighterError;
use crate::domain::ohlcv::{sample_stddev, Bar};
use crate::ports::market_data_port::MarketDataPort;

pub const DEFAULT_WINDOW_SIZE: usize = 10;
pub const DEFAULT_BATCH_SIZE: usize = 200;
/// Smallest window with two prior volumes to take a deviation over.
pub const MIN_WINDOW_SIZE: usize = 3;
/// Whole days a window's last bar may trail the anchor time.
pub const MAX_STALE_DAYS: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Rating {
    pub symbol: String,
    pub value: f64,
    /// Close of the most recent bar in the window.
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingParams {
    pub window_size: usize,
    /// Number of holdings to keep; `None` keeps every positive rating.
    pub max_holdings: Option<usize>,
    /// Symbols per market-data request.
    pub batch_size: usize,
}

impl Default for RatingParams {
    fn default() -> Self {
        RatingParams {
            window_size: DEFAULT_WINDOW_SIZE,
            max_holdings: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Why a symbol produced no rating this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExclusionReason {
    IncompleteWindow { bars: usize, expected: usize },
    StaleWindow { gap_days: i64 },
    NonPositivePrice { close: f64 },
    FlatVolume,
    NonFinite,
    NonPositive { rating: f64 },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::IncompleteWindow { bars, expected } => {
                write!(f, "insufficient history ({} of {} bars)", bars, expected)
            }
            ExclusionReason::StaleWindow { gap_days } => {
                write!(f, "stale data (last bar {} days old)", gap_days)
            }
            ExclusionReason::NonPositivePrice { close } => {
                write!(f, "non-positive close {}", close)
            }
            ExclusionReason::FlatVolume => write!(f, "zero volume deviation"),
            ExclusionReason::NonFinite => write!(f, "non-finite rating"),
            ExclusionReason::NonPositive { rating } => {
                write!(f, "non-positive rating {:.4}", rating)
            }
        }
    }
}

/// Rate a single window. Returns `(rating, price)` for a positive rating.
pub fn rate_window(
    bars: &[Bar],
    window_size: usize,
    anchor: Option<DateTime<Utc>>,
) -> Result<(f64, f64), ExclusionReason> {
    if bars.len() != window_size || bars.len() < 2 {
        return Err(ExclusionReason::IncompleteWindow {
            bars: bars.len(),
            expected: window_size,
        });
    }

    let first = &bars[0];
    let last = &bars[bars.len() - 1];
    let prev = &bars[bars.len() - 2];

    if let Some(anchor) = anchor {
        let gap_days = (anchor - last.timestamp).num_days();
        if gap_days > MAX_STALE_DAYS {
            return Err(ExclusionReason::StaleWindow { gap_days });
        }
    }

    if let Some(bad) = [first, last]
        .into_iter()
        .find(|b| b.close.is_nan() || b.close <= 0.0)
    {
        return Err(ExclusionReason::NonPositivePrice { close: bad.close });
    }

    let price = last.close;
    let price_change = price - first.close;

    let past_volumes: Vec<f64> = bars[..bars.len() - 1].iter().map(|b| b.volume).collect();
    let volume_stdev = match sample_stddev(&past_volumes) {
        Some(sd) if sd != 0.0 => sd,
        _ => return Err(ExclusionReason::FlatVolume),
    };

    let volume_factor = (last.volume - prev.volume) / volume_stdev;
    let rating = price_change / first.close * volume_factor;

    if !rating.is_finite() {
        return Err(ExclusionReason::NonFinite);
    }
    if rating <= 0.0 {
        return Err(ExclusionReason::NonPositive { rating });
    }
    Ok((rating, price))
}

/// Sort descending by value (stable) and keep the top `max_holdings`.
pub fn rank(mut ratings: Vec<Rating>, max_holdings: Option<usize>) -> Vec<Rating> {
    ratings.sort_by(|a, b| b.value.total_cmp(&a.value));
    if let Some(k) = max_holdings {
        ratings.truncate(k);
    }
    ratings
}

/// Rate `symbols` from windows ending at `anchor` (or now).
///
/// Market-data failures are propagated; per-symbol data problems are not.
pub fn rate(
    symbols: &[String],
    source: &dyn MarketDataPort,
    params: &RatingParams,
    anchor: Option<DateTime<Utc>>,
) -> Result<Vec<Rating>, OvernighterError> {
    let mut ratings = Vec::new();

    for batch in symbols.chunks(params.batch_size.max(1)) {
        let barset = source.get_bars(batch, params.window_size, anchor)?;

        ratings.extend(batch.iter().filter_map(|symbol| {
            let window = barset.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
            match rate_window(window, params.window_size, anchor) {
                Ok((value, price)) => Some(Rating {
                    symbol: symbol.clone(),
                    value,
                    price,
                }),
                Err(reason) => {
                    debug!(%symbol, %reason, "excluded from rating");
                    None
                }
            }
        }));
    }

    Ok(rank(ratings, params.max_holdings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 5, 0, 0).unwrap()
    }

    fn window(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&close, &volume))| Bar {
                timestamp: day(1 + i as u32),
                open: close,
                high: close,
                low: close,
                close,
                volume,
            })
            .collect()
    }

    struct FakeSource {
        bars: HashMap<String, Vec<Bar>>,
        requests: RefCell<Vec<usize>>,
    }

    impl FakeSource {
        fn new(entries: Vec<(&str, Vec<Bar>)>) -> Self {
            FakeSource {
                bars: entries
                    .into_iter()
                    .map(|(s, b)| (s.to_string(), b))
                    .collect(),
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl MarketDataPort for FakeSource {
        fn get_bars(
            &self,
            symbols: &[String],
            _limit: usize,
            _end: Option<DateTime<Utc>>,
        ) -> Result<HashMap<String, Vec<Bar>>, OvernighterError> {
            self.requests.borrow_mut().push(symbols.len());
            Ok(symbols
                .iter()
                .filter_map(|s| self.bars.get(s).map(|b| (s.clone(), b.clone())))
                .collect())
        }

        fn get_calendar(
            &self,
            _start: chrono::NaiveDate,
            _end: chrono::NaiveDate,
        ) -> Result<Vec<chrono::NaiveDate>, OvernighterError> {
            Ok(vec![])
        }
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flat_prior_volume_is_excluded() {
        let bars = window(&[10.0, 10.0, 12.0], &[100.0, 100.0, 160.0]);
        assert_eq!(rate_window(&bars, 3, None), Err(ExclusionReason::FlatVolume));
    }

    #[test]
    fn worked_example_rating() {
        let bars = window(&[10.0, 11.0, 12.0], &[100.0, 150.0, 400.0]);
        let (rating, price) = rate_window(&bars, 3, None).unwrap();
        // stdev(100, 150) = 35.355, factor = 250 / 35.355 = 7.071
        assert_relative_eq!(rating, 0.2 * 250.0 / 1250.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(rating, 1.414, epsilon = 1e-3);
        assert_eq!(price, 12.0);
    }

    #[test]
    fn short_window_is_excluded() {
        let bars = window(&[10.0, 11.0], &[100.0, 150.0]);
        assert_eq!(
            rate_window(&bars, 3, None),
            Err(ExclusionReason::IncompleteWindow {
                bars: 2,
                expected: 3
            })
        );
    }

    #[test]
    fn oversized_window_is_excluded() {
        let bars = window(&[10.0, 11.0, 12.0, 13.0], &[100.0, 150.0, 400.0, 500.0]);
        assert!(matches!(
            rate_window(&bars, 3, None),
            Err(ExclusionReason::IncompleteWindow { .. })
        ));
    }

    #[test]
    fn falling_price_is_excluded() {
        let bars = window(&[12.0, 11.0, 10.0], &[100.0, 150.0, 400.0]);
        assert!(matches!(
            rate_window(&bars, 3, None),
            Err(ExclusionReason::NonPositive { .. })
        ));
    }

    #[test]
    fn falling_volume_with_falling_price_is_positive() {
        // both factors negative: (-2/12) * (-250/35.36) > 0
        let bars = window(&[12.0, 11.0, 10.0], &[150.0, 400.0, 150.0]);
        let (rating, _) = rate_window(&bars, 3, None).unwrap();
        assert!(rating > 0.0);
    }

    #[test]
    fn zero_first_close_is_excluded() {
        let bars = window(&[0.0, 11.0, 12.0], &[100.0, 150.0, 400.0]);
        assert_eq!(
            rate_window(&bars, 3, None),
            Err(ExclusionReason::NonPositivePrice { close: 0.0 })
        );
    }

    #[test]
    fn zero_last_close_is_excluded() {
        // falling price and falling volume would otherwise rate positive
        let bars = window(&[10.0, 11.0, 0.0], &[100.0, 400.0, 150.0]);
        assert_eq!(
            rate_window(&bars, 3, None),
            Err(ExclusionReason::NonPositivePrice { close: 0.0 })
        );
    }

    #[test]
    fn rate_skips_zero_priced_symbol() {
        let source = FakeSource::new(vec![
            ("Z", window(&[10.0, 11.0, 0.0], &[100.0, 400.0, 150.0])),
            ("A", window(&[10.0, 11.0, 12.0], &[100.0, 150.0, 400.0])),
        ]);
        let params = RatingParams {
            window_size: 3,
            ..RatingParams::default()
        };
        let ratings = rate(&symbols(&["Z", "A"]), &source, &params, None).unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].symbol, "A");
    }

    #[test]
    fn stale_window_is_excluded() {
        let bars = window(&[10.0, 11.0, 12.0], &[100.0, 150.0, 400.0]);
        let last = bars[2].timestamp;
        assert!(rate_window(&bars, 3, Some(last + Duration::hours(47))).is_ok());
        assert_eq!(
            rate_window(&bars, 3, Some(last + Duration::days(3))),
            Err(ExclusionReason::StaleWindow { gap_days: 3 })
        );
    }

    #[test]
    fn staleness_ignored_without_anchor() {
        let bars = window(&[10.0, 11.0, 12.0], &[100.0, 150.0, 400.0]);
        assert!(rate_window(&bars, 3, None).is_ok());
    }

    #[test]
    fn rate_filters_and_sorts() {
        let source = FakeSource::new(vec![
            ("A", window(&[10.0, 10.0, 12.0], &[100.0, 100.0, 160.0])),
            ("B", window(&[10.0, 11.0, 12.0], &[100.0, 150.0, 400.0])),
            ("C", window(&[10.0, 11.0, 15.0], &[100.0, 150.0, 400.0])),
            ("D", window(&[10.0, 11.0], &[100.0, 150.0])),
        ]);
        let params = RatingParams {
            window_size: 3,
            ..RatingParams::default()
        };
        let ratings = rate(&symbols(&["A", "B", "C", "D", "E"]), &source, &params, None).unwrap();

        let names: Vec<_> = ratings.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(names, vec!["C", "B"]);
        assert_eq!(ratings[0].price, 15.0);
    }

    #[test]
    fn rate_truncates_to_max_holdings() {
        let source = FakeSource::new(vec![
            ("B", window(&[10.0, 11.0, 12.0], &[100.0, 150.0, 400.0])),
            ("C", window(&[10.0, 11.0, 15.0], &[100.0, 150.0, 400.0])),
        ]);
        let params = RatingParams {
            window_size: 3,
            max_holdings: Some(1),
            ..RatingParams::default()
        };
        let ratings = rate(&symbols(&["B", "C"]), &source, &params, None).unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].symbol, "C");
    }

    #[test]
    fn rate_fetches_in_batches() {
        let source = FakeSource::new(vec![
            ("B", window(&[10.0, 11.0, 12.0], &[100.0, 150.0, 400.0])),
            ("C", window(&[10.0, 11.0, 15.0], &[100.0, 150.0, 400.0])),
        ]);
        let params = RatingParams {
            window_size: 3,
            max_holdings: None,
            batch_size: 2,
        };
        let ratings = rate(&symbols(&["A", "B", "C", "D", "E"]), &source, &params, None).unwrap();
        assert_eq!(*source.requests.borrow(), vec![2, 2, 1]);
        assert_eq!(ratings.len(), 2);
    }

    #[test]
    fn rank_is_stable_for_ties() {
        let r = |s: &str, v: f64| Rating {
            symbol: s.into(),
            value: v,
            price: 1.0,
        };
        let ranked = rank(vec![r("X", 1.0), r("Y", 2.0), r("Z", 1.0)], None);
        let names: Vec<_> = ranked.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(names, vec!["Y", "X", "Z"]);
    }

    proptest! {
        #[test]
        fn ratings_are_positive_and_descending(
            rows in prop::collection::vec(
                (prop::collection::vec(1.0f64..100.0, 4), prop::collection::vec(0.0f64..10_000.0, 4)),
                1..12,
            )
        ) {
            let entries: Vec<(String, Vec<Bar>)> = rows
                .iter()
                .enumerate()
                .map(|(i, (c, v))| (format!("S{}", i), window(c, v)))
                .collect();
            let names: Vec<String> = entries.iter().map(|(s, _)| s.clone()).collect();
            let source = FakeSource {
                bars: entries.into_iter().collect(),
                requests: RefCell::new(Vec::new()),
            };
            let params = RatingParams { window_size: 4, max_holdings: None, batch_size: 5 };
            let ratings = rate(&names, &source, &params, None).unwrap();

            for r in &ratings {
                prop_assert!(r.value > 0.0);
            }
            for pair in ratings.windows(2) {
                prop_assert!(pair[0].value >= pair[1].value);
            }
        }

        #[test]
        fn wrong_length_windows_never_rated(len in 0usize..8) {
            prop_assume!(len != 4);
            let closes: Vec<f64> = (0..len).map(|i| 10.0 + i as f64).collect();
            let volumes: Vec<f64> = (0..len).map(|i| 100.0 * (i * i + 1) as f64).collect();
            let bars = window(&closes, &volumes);
            let is_incomplete = matches!(
                rate_window(&bars, 4, None),
                Err(ExclusionReason::IncompleteWindow { .. })
            );
            prop_assert!(is_incomplete);
        }
    }
}
