//! Market data access port trait.

use crate::domain::error::OvernighterError;
use crate::domain::ohlcv::Bar;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

pub trait MarketDataPort {
    /// Up to `limit` daily bars per symbol ending at `end` (or now), oldest first.
    ///
    /// Symbols without data may be missing from the map or map to a short vector.
    fn get_bars(
        &self,
        symbols: &[String],
        limit: usize,
        end: Option<DateTime<Utc>>,
    ) -> Result<HashMap<String, Vec<Bar>>, OvernighterError>;

    /// Trading days between `start` and `end` inclusive, in order.
    fn get_calendar(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, OvernighterError>;
}
