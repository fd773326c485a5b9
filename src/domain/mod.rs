//! Core domain types and logic.

pub mod ohlcv;
pub mod market;
pub mod rating;
pub mod sizing;
pub mod risk;
pub mod backtest;
pub mod live;
pub mod universe;
pub mod config_validation;
pub mod error;
