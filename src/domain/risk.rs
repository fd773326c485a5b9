//! Risk sizing helpers.

/// Cash the strategy is willing to deploy in the next sizing cycle.
pub fn tolerable_risk(cash: f64, fraction: f64) -> f64 {
    (cash * fraction).max(0.0)
}

/// Whole shares affordable when `risk` is lost between `entry` and `stop`.
pub fn position_size(risk: f64, entry: f64, stop: f64) -> u64 {
    let per_share = (entry - stop).abs();
    if per_share == 0.0 || risk <= 0.0 {
        return 0;
    }
    (risk / per_share).floor() as u64
}
