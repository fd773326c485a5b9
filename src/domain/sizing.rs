//! Proportional position sizing.
//!
//! Each rated symbol receives a slice of the cash budget proportional to its
//! share of the total rating:
//!
//! ```text
//! shares[s] = rating[s] / sum(rating) * cash / price[s]
//! ```

use std::collections::HashMap;

use crate::domain::rating::Rating;

/// Per-symbol share counts, in rating order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    entries: Vec<(String, f64)>,
}

impl Allocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<(String, f64)>) -> Self {
        Allocation { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, shares)| *shares)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(s, shares)| (s.as_str(), *shares))
    }

    pub fn symbols(&self) -> Vec<String> {
        self.entries.iter().map(|(s, _)| s.clone()).collect()
    }

    /// Floored to whole shares; symbols rounding down to zero are dropped.
    pub fn whole_shares(&self) -> Allocation {
        Allocation {
            entries: self
                .entries
                .iter()
                .map(|(s, shares)| (s.clone(), shares.floor()))
                .filter(|(_, shares)| *shares >= 1.0)
                .collect(),
        }
    }

    /// Market value at `prices`; symbols without a price are skipped.
    pub fn value_at(&self, prices: &HashMap<String, f64>) -> f64 {
        self.entries
            .iter()
            .filter_map(|(s, shares)| prices.get(s).map(|p| shares * p))
            .sum()
    }
}

/// Split `cash` across `ratings` proportionally to rating value.
///
/// An empty table, or one whose ratings sum to zero, yields an empty allocation.
/// Entries whose share count is not finite are left out.
pub fn size(ratings: &[Rating], cash: f64) -> Allocation {
    let total: f64 = ratings.iter().map(|r| r.value).sum();
    if ratings.is_empty() || total == 0.0 || !total.is_finite() {
        return Allocation::new();
    }

    Allocation {
        entries: ratings
            .iter()
            .map(|r| (r.symbol.clone(), r.value / total * cash / r.price))
            .filter(|(_, shares)| shares.is_finite())
            .collect(),
    }
}
