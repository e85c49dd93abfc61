mod consumer;
mod ingest;
mod publisher;

pub use consumer::{ConsumerConfig, ConsumerState, OrderConsumer};
pub use ingest::{Disposition, OrderIngestor};
pub use publisher::{OrderPublisher, PublishError};
