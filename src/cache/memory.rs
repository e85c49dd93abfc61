use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::OrderCache;
use crate::domain::order::Order;

/// Unbounded in-process cache.
///
/// One reader/writer lock guards the whole map: readers never block each
/// other, a writer holds the lock only for the map mutation itself. A sharded
/// map would scale further under heavy write load; the order volume does not
/// call for it yet.
#[derive(Default)]
pub struct MemoryCache {
    orders: RwLock<HashMap<String, Order>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderCache for MemoryCache {
    async fn get(&self, order_uid: &str) -> Option<Order> {
        self.orders.read().await.get(order_uid).cloned()
    }

    async fn upsert(&self, order: Order) {
        let order_uid = order.order_uid.clone();
        self.orders.write().await.insert(order_uid, order);
    }

    async fn remove(&self, order_uid: &str) -> bool {
        self.orders.write().await.remove(order_uid).is_some()
    }

    async fn list(&self) -> Vec<Order> {
        self.orders.read().await.values().cloned().collect()
    }

    async fn all_ids(&self) -> Vec<String> {
        self.orders.read().await.keys().cloned().collect()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
