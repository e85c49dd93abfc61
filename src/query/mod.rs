use std::sync::Arc;

use crate::cache::OrderCache;
use crate::domain::order::Order;
use crate::metrics::Metrics;
use crate::storage::{OrderStore, StoreError};

// ============================================================================
// Order Service - read path and administrative writes
// ============================================================================
//
// Reads: cache first; on a miss, the store; a store hit is backfilled into
// the cache before returning. Concurrent misses for the same order each go to
// the store and each backfill. Upsert is idempotent, so that only costs a
// redundant query.
//
// Writes: store first, then cache (write-through). A failed store write
// leaves the cache untouched.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("order {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct OrderService {
    cache: Arc<dyn OrderCache>,
    store: Arc<dyn OrderStore>,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(cache: Arc<dyn OrderCache>, store: Arc<dyn OrderStore>, metrics: Arc<Metrics>) -> Self {
        Self { cache, store, metrics }
    }

    pub async fn get_by_uid(&self, order_uid: &str) -> Result<Order, QueryError> {
        if let Some(order) = self.cache.get(order_uid).await {
            self.metrics.record_lookup("cache");
            return Ok(order);
        }

        tracing::debug!(order_uid = %order_uid, "Cache miss, falling back to store");

        match self.store.get(order_uid).await? {
            Some(order) => {
                self.metrics.record_lookup("store");
                self.cache.upsert(order.clone()).await;
                Ok(order)
            }
            None => {
                self.metrics.record_lookup("miss");
                Err(QueryError::NotFound(order_uid.to_string()))
            }
        }
    }

    /// Administrative upsert outside the message feed.
    pub async fn update(&self, mut order: Order) -> Result<(), StoreError> {
        order.normalize();
        self.store.save(&order).await?;
        tracing::info!(order_uid = %order.order_uid, "Order updated through admin path");
        self.cache.upsert(order).await;
        Ok(())
    }

    /// Remove an order from the store and then from the cache.
    /// Returns whether the store held it.
    pub async fn delete(&self, order_uid: &str) -> Result<bool, StoreError> {
        let existed = self.store.delete(order_uid).await?;
        self.cache.remove(order_uid).await;

        tracing::info!(order_uid = %order_uid, existed, "Order deleted through admin path");
        Ok(existed)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
