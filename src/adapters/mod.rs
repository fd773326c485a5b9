//! Concrete adapter implementations for ports.

pub mod alpaca_adapter;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod thread_timer;
