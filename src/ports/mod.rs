//! Port traits (hexagonal architecture boundaries).

pub mod broker_port;
pub mod clock_port;
pub mod config_port;
pub mod market_data_port;
pub mod timer_port;
