/// A dependency could not be reached while the process was starting.
/// Startup aborts on any of these; nothing is served.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("cannot reach PostgreSQL: {0}")]
    Database(#[source] sqlx::Error),

    #[error("cannot apply schema migration: {0}")]
    Migration(#[source] sqlx::Error),

    #[error("cannot reach Kafka brokers {brokers}: {source}")]
    Broker {
        brokers: String,
        #[source]
        source: rdkafka::error::KafkaError,
    },

    #[error("cannot reach Redis: {0}")]
    Cache(#[source] redis::RedisError),
}
