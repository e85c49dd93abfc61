use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::OrderCache;
use crate::domain::order::Order;
use crate::error::ConnectionError;

pub const DEFAULT_KEY_PREFIX: &str = "order_lookup:";

/// Redis-backed cache shared between service instances.
///
/// Layout:
/// - `<prefix>order:<order_uid>`  the order as JSON
/// - `<prefix>order_ids`          set of every cached order_uid
///
/// Redis errors never reach the caller. A failed read is a miss and a failed
/// write is dropped; the next lookup falls back to the store and backfills.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisCache {
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, ConnectionError> {
        let client = redis::Client::open(url).map_err(ConnectionError::Cache)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(ConnectionError::Cache)?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(ConnectionError::Cache)?;

        let prefix = prefix.into();
        tracing::info!(prefix = %prefix, "Connected to Redis order cache");
        Ok(Self { conn, prefix })
    }

    fn order_key(&self, order_uid: &str) -> String {
        format!("{}order:{}", self.prefix, order_uid)
    }

    fn ids_key(&self) -> String {
        format!("{}order_ids", self.prefix)
    }

    async fn fetch(&self, keys: Vec<String>) -> redis::RedisResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        redis::cmd("MGET").arg(keys).query_async(&mut conn).await
    }
}

fn decode(order_uid: &str, raw: &str) -> Option<Order> {
    match serde_json::from_str(raw) {
        Ok(order) => Some(order),
        Err(e) => {
            tracing::warn!(order_uid = %order_uid, error = %e, "Discarding undecodable cache entry");
            None
        }
    }
}

#[async_trait]
impl OrderCache for RedisCache {
    async fn get(&self, order_uid: &str) -> Option<Order> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(self.order_key(order_uid)).await {
            Ok(raw) => raw.and_then(|raw| decode(order_uid, &raw)),
            Err(e) => {
                tracing::warn!(order_uid = %order_uid, error = %e, "Redis read failed, treating as miss");
                None
            }
        }
    }

    async fn upsert(&self, order: Order) {
        let payload = match serde_json::to_string(&order) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(order_uid = %order.order_uid, error = %e, "Cannot encode order for Redis");
                return;
            }
        };

        let mut conn = self.conn.clone();
        let result = redis::pipe()
            .atomic()
            .set(self.order_key(&order.order_uid), payload)
            .ignore()
            .sadd(self.ids_key(), &order.order_uid)
            .ignore()
            .query_async::<()>(&mut conn)
            .await;

        if let Err(e) = result {
            tracing::warn!(order_uid = %order.order_uid, error = %e, "Redis write failed, entry left stale");
        }
    }

    async fn remove(&self, order_uid: &str) -> bool {
        let mut conn = self.conn.clone();
        let result = redis::pipe()
            .atomic()
            .del(self.order_key(order_uid))
            .srem(self.ids_key(), order_uid)
            .ignore()
            .query_async::<(i64,)>(&mut conn)
            .await;

        match result {
            Ok((deleted,)) => deleted > 0,
            Err(e) => {
                tracing::warn!(order_uid = %order_uid, error = %e, "Redis delete failed");
                false
            }
        }
    }

    async fn list(&self) -> Vec<Order> {
        let ids = self.all_ids().await;
        let keys = ids.iter().map(|id| self.order_key(id)).collect();

        match self.fetch(keys).await {
            Ok(values) => ids
                .iter()
                .zip(values)
                .filter_map(|(id, raw)| raw.and_then(|raw| decode(id, &raw)))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Redis list failed");
                Vec::new()
            }
        }
    }

    async fn all_ids(&self) -> Vec<String> {
        let mut conn = self.conn.clone();
        match conn.smembers::<_, Vec<String>>(self.ids_key()).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "Redis id scan failed");
                Vec::new()
            }
        }
    }
}

// ============================================================================
// Integration Tests (need a disposable Redis at REDIS_URL)
// ============================================================================
