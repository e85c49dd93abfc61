use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::{Message, OwnedMessage};
use rdkafka::{Offset, TopicPartitionList};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::ingest::{Disposition, OrderIngestor};
use crate::error::ConnectionError;
use crate::metrics::Metrics;
use crate::utils::{retry_with_backoff, RetryConfig};

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Order Consumer - durable subscription on the orders topic
// ============================================================================
//
// Lifecycle: Disconnected -> Connecting -> Subscribed -> Draining -> Closed
//
// Acknowledgment is an explicit offset commit per message. A message that
// cannot be persisted is left uncommitted; after `ack_wait` the partition is
// seeked back to it and the broker hands it out again. Later messages on the
// same partition wait behind it, so per-partition order is kept.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Subscribed,
    Draining,
    Closed,
}

impl ConsumerState {
    pub fn as_gauge(self) -> i64 {
        match self {
            ConsumerState::Disconnected => 0,
            ConsumerState::Connecting => 1,
            ConsumerState::Subscribed => 2,
            ConsumerState::Draining => 3,
            ConsumerState::Closed => 4,
        }
    }

    pub fn is_serving(self) -> bool {
        self == ConsumerState::Subscribed
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsumerState::Disconnected => "disconnected",
            ConsumerState::Connecting => "connecting",
            ConsumerState::Subscribed => "subscribed",
            ConsumerState::Draining => "draining",
            ConsumerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub brokers: String,
    pub topic: String,
    /// Consumer group id; committed offsets under it survive restarts.
    pub durable_name: String,
    pub ack_wait: Duration,
}

pub struct OrderConsumer {
    consumer: StreamConsumer,
    config: ConsumerConfig,
    ingestor: Arc<OrderIngestor>,
    metrics: Arc<Metrics>,
    state: watch::Sender<ConsumerState>,
}

impl OrderConsumer {
    /// Create the Kafka consumer, make sure the brokers answer, and subscribe.
    pub async fn connect(
        config: ConsumerConfig,
        ingestor: Arc<OrderIngestor>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ConnectionError> {
        let (state, _) = watch::channel(ConsumerState::Disconnected);
        metrics.consumer_state.set(ConsumerState::Disconnected.as_gauge());

        let broker_error = |source| ConnectionError::Broker {
            brokers: config.brokers.clone(),
            source,
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.durable_name)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "10000")
            .create()
            .map_err(broker_error)?;

        let this = Self {
            consumer,
            config: config.clone(),
            ingestor,
            metrics,
            state,
        };
        this.set_state(ConsumerState::Connecting);

        tracing::info!(
            brokers = %config.brokers,
            topic = %config.topic,
            durable_name = %config.durable_name,
            "Connecting to Kafka"
        );

        retry_with_backoff(&RetryConfig::startup(), "kafka_metadata", |_attempt| {
            let consumer = &this.consumer;
            let topic = config.topic.as_str();
            async move {
                tokio::task::block_in_place(|| {
                    consumer.fetch_metadata(Some(topic), METADATA_TIMEOUT)
                })
                .map(|_| ())
            }
        })
        .await
        .map_err(broker_error)?;

        this.consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(broker_error)?;
        this.set_state(ConsumerState::Subscribed);

        tracing::info!(
            topic = %config.topic,
            ack_wait_secs = config.ack_wait.as_secs(),
            "📥 Subscribed to order feed"
        );
        Ok(this)
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Consume until `shutdown` fires. A message already being handled is
    /// finished (persisted, cached, committed) before the subscription closes.
    pub async fn run(self, shutdown: CancellationToken) {
        {
            let mut stream = self.consumer.stream();

            loop {
                let next = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = stream.next() => next,
                };

                let message = match next {
                    Some(Ok(borrowed)) => borrowed.detach(),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Kafka consumer error");
                        continue;
                    }
                    None => {
                        tracing::warn!("Kafka message stream ended");
                        break;
                    }
                };

                self.process(message, &shutdown).await;
            }
        }

        self.set_state(ConsumerState::Draining);
        tracing::info!("Draining order consumer");
        self.consumer.unsubscribe();

        let OrderConsumer { consumer, state, metrics, .. } = self;
        drop(consumer);

        state.send_replace(ConsumerState::Closed);
        metrics.consumer_state.set(ConsumerState::Closed.as_gauge());
        tracing::info!("🛑 Order consumer closed");
    }

    async fn process(&self, message: OwnedMessage, shutdown: &CancellationToken) {
        settle(&self.ingestor, &self.consumer, &message, self.config.ack_wait, shutdown).await;
    }

    fn set_state(&self, next: ConsumerState) {
        self.state.send_replace(next);
        self.metrics.consumer_state.set(next.as_gauge());
    }
}

/// Broker-side effects of settling one message.
pub(crate) trait OffsetControl {
    /// Acknowledge everything before `next_offset` on the partition.
    fn commit(&self, topic: &str, partition: i32, next_offset: i64) -> KafkaResult<()>;

    /// Move the partition's fetch position back to `offset`.
    fn rewind(&self, topic: &str, partition: i32, offset: i64) -> KafkaResult<()>;
}

impl OffsetControl for StreamConsumer {
    fn commit(&self, topic: &str, partition: i32, next_offset: i64) -> KafkaResult<()> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(topic, partition, Offset::Offset(next_offset))?;
        Consumer::commit(self, &offsets, CommitMode::Async)
    }

    fn rewind(&self, topic: &str, partition: i32, offset: i64) -> KafkaResult<()> {
        Consumer::seek(self, topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settled {
    Committed,
    Rewound,
    /// Neither committed nor rewound; the next session starts at this offset.
    LeftPending,
}

/// Hand one message to the ingestor, then commit it or, after `ack_wait`,
/// rewind its partition so the broker delivers it again. The ingestor call
/// itself is never interrupted; only the ack-wait yields to `shutdown`.
pub(crate) async fn settle<C: OffsetControl + ?Sized>(
    ingestor: &OrderIngestor,
    offsets: &C,
    message: &OwnedMessage,
    ack_wait: Duration,
    shutdown: &CancellationToken,
) -> Settled {
    let payload = message.payload().unwrap_or_default();
    let (topic, partition, offset) = (message.topic(), message.partition(), message.offset());

    match ingestor.handle(payload).await {
        Disposition::Ack => match offsets.commit(topic, partition, offset + 1) {
            Ok(()) => Settled::Committed,
            Err(e) => {
                // Redelivered after a restart; handling is idempotent.
                tracing::warn!(partition, offset, error = %e, "Failed to commit offset");
                Settled::LeftPending
            }
        },
        Disposition::Redeliver => {
            tracing::debug!(
                partition,
                offset,
                ack_wait_ms = ack_wait.as_millis() as u64,
                "Waiting out ack-wait before redelivery"
            );

            tokio::select! {
                _ = shutdown.cancelled() => return Settled::LeftPending,
                _ = tokio::time::sleep(ack_wait) => {}
            }

            match offsets.rewind(topic, partition, offset) {
                Ok(()) => Settled::Rewound,
                Err(e) => {
                    tracing::error!(partition, offset, error = %e, "Failed to rewind partition for redelivery");
                    Settled::LeftPending
                }
            }
        }
    }
}
