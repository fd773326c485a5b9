//! Broker port trait.

use crate::domain::error::OvernighterError;
use crate::domain::market::{OrderHistory, OrderRequest};
use chrono::{DateTime, Utc};

pub trait BrokerPort {
    /// Cash currently available in the account.
    fn cash(&self) -> Result<f64, OvernighterError>;

    /// Orders of any status submitted after `after`.
    ///
    /// An account without matching orders is `OrderHistory::NoOrders`, not an error.
    fn list_orders(
        &self,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<OrderHistory, OvernighterError>;

    fn submit_order(&self, order: &OrderRequest) -> Result<(), OvernighterError>;

    fn close_all_positions(&self) -> Result<(), OvernighterError>;
}
