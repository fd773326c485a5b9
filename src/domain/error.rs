//! Domain error types.

use crate::domain::universe::UniverseError;

/// Top-level error type for overnighter.
#[derive(Debug, thiserror::Error)]
pub enum OvernighterError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("a broker instance is required")]
    MissingBroker,

    #[error("market data error: {reason}")]
    MarketData { reason: String },

    #[error("broker error: {reason}")]
    Broker { reason: String },

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&OvernighterError> for std::process::ExitCode {
    fn from(err: &OvernighterError) -> Self {
        let code: u8 = match err {
            OvernighterError::Io(_) => 1,
            OvernighterError::ConfigParse { .. }
            | OvernighterError::ConfigMissing { .. }
            | OvernighterError::ConfigInvalid { .. } => 2,
            OvernighterError::MarketData { .. } => 3,
            OvernighterError::Broker { .. } => 4,
            OvernighterError::MissingBroker | OvernighterError::Universe(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}
