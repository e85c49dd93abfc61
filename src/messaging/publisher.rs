use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use crate::domain::order::Order;
use crate::error::ConnectionError;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("cannot encode order: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Send(#[from] CircuitBreakerError<KafkaError>),
}

/// Writes order payloads onto the feed, keyed by `order_uid`.
/// Sends go through a circuit breaker so a dead broker fails fast.
pub struct OrderPublisher {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
}

impl OrderPublisher {
    pub fn new(brokers: &str) -> Result<Self, ConnectionError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|source| ConnectionError::Broker {
                brokers: brokers.to_string(),
                source,
            })?;

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new("kafka_producer", CircuitBreakerConfig::default()),
        })
    }

    pub async fn publish_order(&self, topic: &str, order: &Order) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(order)?;
        self.publish_raw(topic, &order.order_uid, &payload).await
    }

    /// Send bytes as-is. Lets callers put payloads on the feed that would not
    /// survive `Order` serialization.
    pub async fn publish_raw(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(topic).key(key).payload(payload);
                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map_err(|(e, _)| e)
            })
            .await;

        match result {
            Ok(_) => {
                tracing::info!(topic, key, bytes = payload.len(), "Published order message");
                Ok(())
            }
            Err(e) => {
                tracing::error!(topic, key, error = %e, "Failed to publish order message");
                Err(e.into())
            }
        }
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }
}
