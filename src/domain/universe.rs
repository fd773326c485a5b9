//! Candidate symbol universe.
//!
//! The strategy only needs an ordered list of symbols to rate. Selection
//! logic lives behind [`AssetSelector`]; [`StaticUniverse`] is the
//! configured-list implementation used by the binary.

use std::collections::HashSet;

pub trait AssetSelector {
    /// Candidate symbols in rating order.
    fn portfolio(&self) -> &[String];
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticUniverse {
    symbols: Vec<String>,
}

impl StaticUniverse {
    pub fn new(symbols: Vec<String>) -> Result<Self, UniverseError> {
        if symbols.is_empty() {
            return Err(UniverseError::Empty);
        }
        Ok(Self { symbols })
    }

    /// Parse a comma-separated symbol list.
    pub fn parse(input: &str) -> Result<Self, UniverseError> {
        Self::new(parse_symbols(input)?)
    }

    pub fn count(&self) -> usize {
        self.symbols.len()
    }
}

impl AssetSelector for StaticUniverse {
    fn portfolio(&self) -> &[String] {
        &self.symbols
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("no symbols configured")]
    Empty,
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    if input.trim().is_empty() {
        return Err(UniverseError::Empty);
    }

    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}
