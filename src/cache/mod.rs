// ============================================================================
// Order Cache
// ============================================================================
//
// Read-side mirror of the Persistence Store, keyed by order_uid. The store is
// the source of truth: the cache is written only after a store write commits
// and can always be rebuilt with `warmup`.
//
// Backends:
// - MemoryCache  process-local map behind a reader/writer lock (default)
// - RedisCache   shared key-value copy for several service instances
//
// Neither backend evicts or expires entries.
//
// ============================================================================

mod memory;
mod remote;

use async_trait::async_trait;

use crate::domain::order::Order;
use crate::storage::{OrderStore, StoreError};

pub use memory::MemoryCache;
pub use remote::{RedisCache, DEFAULT_KEY_PREFIX};

#[async_trait]
pub trait OrderCache: Send + Sync {
    async fn get(&self, order_uid: &str) -> Option<Order>;

    /// Replace whatever is cached under `order.order_uid`. Never refuses a write.
    async fn upsert(&self, order: Order);

    /// Returns whether an entry was removed.
    async fn remove(&self, order_uid: &str) -> bool;

    /// Snapshot of every cached order, in no particular order.
    async fn list(&self) -> Vec<Order>;

    async fn all_ids(&self) -> Vec<String>;

    /// Load every persisted order into the cache. Run once before serving traffic.
    async fn warmup(&self, store: &dyn OrderStore) -> Result<usize, StoreError> {
        tracing::info!("Warming up order cache from the store");

        let orders = store.list().await?;
        let count = orders.len();
        for order in orders {
            self.upsert(order).await;
        }

        tracing::info!(count, "✅ Order cache warmed up");
        Ok(count)
    }
}
