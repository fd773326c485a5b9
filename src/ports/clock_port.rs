//! Market clock port trait.

use crate::domain::error::OvernighterError;
use crate::domain::market::MarketClock;

pub trait ClockPort {
    fn get_clock(&self) -> Result<MarketClock, OvernighterError>;
}
