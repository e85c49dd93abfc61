// ============================================================================
// Persistence Store
// ============================================================================
//
// The relational copy of every Order aggregate and the source of truth for
// the cache. Failures are handed back to the caller untouched: nothing here
// retries, the message consumer leaves retry to broker redelivery.
//
// ============================================================================

mod postgres;

use async_trait::async_trait;

use crate::domain::order::Order;

pub use postgres::PgOrderStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored order {order_uid} is inconsistent: {reason}")]
    Corrupt { order_uid: String, reason: String },
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert or replace the whole aggregate in one transaction.
    async fn save(&self, order: &Order) -> Result<(), StoreError>;

    /// `Ok(None)` when no order has this identifier.
    async fn get(&self, order_uid: &str) -> Result<Option<Order>, StoreError>;

    /// Every persisted order. Only used for cache warm-up.
    async fn list(&self) -> Result<Vec<Order>, StoreError>;

    /// Returns whether a row was removed.
    async fn delete(&self, order_uid: &str) -> Result<bool, StoreError>;
}
