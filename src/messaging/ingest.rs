use std::sync::Arc;
use std::time::Instant;

use crate::cache::OrderCache;
use crate::domain::order::Order;
use crate::metrics::Metrics;
use crate::storage::OrderStore;

/// What the consumer should tell the broker about a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Commit the offset. Used for persisted orders and for payloads that no
    /// amount of redelivery could fix.
    Ack,
    /// Leave the offset uncommitted so the broker hands the message out again.
    Redeliver,
}

/// Per-message write path: decode, persist, then cache.
///
/// The cache is only touched after the store transaction committed, and the
/// message is only acknowledged after both. Save and upsert are idempotent,
/// so a redelivered message converges on the same state.
pub struct OrderIngestor {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCache>,
    metrics: Arc<Metrics>,
}

impl OrderIngestor {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<dyn OrderCache>, metrics: Arc<Metrics>) -> Self {
        Self { store, cache, metrics }
    }

    pub async fn handle(&self, payload: &[u8]) -> Disposition {
        let started = Instant::now();

        let order = match Order::from_payload(payload) {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    payload_bytes = payload.len(),
                    "Dropping malformed order message"
                );
                self.metrics.record_message("malformed", started.elapsed().as_secs_f64());
                return Disposition::Ack;
            }
        };

        if let Err(e) = self.store.save(&order).await {
            tracing::error!(
                order_uid = %order.order_uid,
                error = %e,
                "Failed to persist order, leaving message for redelivery"
            );
            self.metrics.record_message("redelivery", started.elapsed().as_secs_f64());
            return Disposition::Redeliver;
        }

        let order_uid = order.order_uid.clone();
        let item_count = order.items.len();
        self.cache.upsert(order).await;

        tracing::info!(
            order_uid = %order_uid,
            item_count,
            "✅ Order persisted and cached"
        );
        self.metrics.record_message("persisted", started.elapsed().as_secs_f64());

        Disposition::Ack
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::query::{OrderService, QueryError};
    use crate::testing::{sample_order, FakeStore};

    struct Harness {
        ingestor: OrderIngestor,
        service: OrderService,
        cache: Arc<MemoryCache>,
        store: Arc<FakeStore>,
    }

    fn harness() -> Harness {
        let cache = Arc::new(MemoryCache::new());
        let store = Arc::new(FakeStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        Harness {
            ingestor: OrderIngestor::new(store.clone(), cache.clone(), metrics.clone()),
            service: OrderService::new(cache.clone(), store.clone(), metrics),
            cache,
            store,
        }
    }

    #[tokio::test]
    async fn test_minimal_order_is_persisted_and_readable() {
        let h = harness();
        let payload = br#"{"order_uid":"abc123","date_created":"2024-01-01T00:00:00Z","items":[]}"#;

        assert_eq!(h.ingestor.handle(payload).await, Disposition::Ack);

        assert!(h.store.stored("abc123").await.is_some());
        let order = h.service.get_by_uid("abc123").await.unwrap();
        assert_eq!(order.order_uid, "abc123");
    }

    #[tokio::test]
    async fn test_null_items_order_is_persisted() {
        let h = harness();
        let payload = br#"{"order_uid":"no-items","date_created":"2024-01-01T00:00:00Z","items":null}"#;

        assert_eq!(h.ingestor.handle(payload).await, Disposition::Ack);

        assert_eq!(h.store.save_calls(), 1);
        assert!(h.service.get_by_uid("no-items").await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_missing_order_uid_is_acked_and_not_stored() {
        let h = harness();
        let payload = br#"{"date_created":"2024-01-01T00:00:00Z","items":[]}"#;

        assert_eq!(h.ingestor.handle(payload).await, Disposition::Ack);

        assert_eq!(h.store.save_calls(), 0);
        assert_eq!(h.store.len().await, 0);
        assert!(h.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_garbage_payload_is_acked() {
        let h = harness();
        assert_eq!(h.ingestor.handle(b"definitely not json").await, Disposition::Ack);
        assert_eq!(h.store.save_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_requests_redelivery_and_skips_cache() {
        let h = harness();
        h.store.fail_saves(true);
        let payload = serde_json::to_vec(&sample_order("flaky")).unwrap();

        assert_eq!(h.ingestor.handle(&payload).await, Disposition::Redeliver);
        assert!(h.cache.get("flaky").await.is_none());

        // The broker redelivers once the store is back.
        h.store.fail_saves(false);
        assert_eq!(h.ingestor.handle(&payload).await, Disposition::Ack);
        assert!(h.cache.get("flaky").await.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_converges_to_one_entry() {
        let h = harness();
        let payload = serde_json::to_vec(&sample_order("dup")).unwrap();

        h.ingestor.handle(&payload).await;
        h.ingestor.handle(&payload).await;

        assert_eq!(h.store.len().await, 1);
        assert_eq!(h.store.stored("dup").await.unwrap().items.len(), 1);
        assert_eq!(h.cache.all_ids().await, vec!["dup".to_string()]);
    }

    #[tokio::test]
    async fn test_later_version_wins() {
        let h = harness();
        let first = sample_order("versioned");
        let mut second = first.clone();
        second.locale = Some("ru".to_string());
        second.items.clear();

        h.ingestor.handle(&serde_json::to_vec(&first).unwrap()).await;
        h.ingestor.handle(&serde_json::to_vec(&second).unwrap()).await;

        assert_eq!(h.store.stored("versioned").await, Some(second.clone()));
        assert_eq!(h.cache.get("versioned").await, Some(second));
    }

    #[tokio::test]
    async fn test_consumed_order_reads_back_deep_equal() {
        let h = harness();
        let order = sample_order("roundtrip");

        h.ingestor.handle(&serde_json::to_vec(&order).unwrap()).await;

        // Through the cache, and again through the store after a cold start.
        assert_eq!(h.service.get_by_uid("roundtrip").await.unwrap(), order);
        h.cache.remove("roundtrip").await;
        assert_eq!(h.service.get_by_uid("roundtrip").await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_unknown_order_after_ingest_is_not_found() {
        let h = harness();
        h.ingestor.handle(&serde_json::to_vec(&sample_order("present")).unwrap()).await;

        assert!(matches!(
            h.service.get_by_uid("missing-id").await,
            Err(QueryError::NotFound(_))
        ));
    }
}
