pub mod ingest;
pub mod kafka;
pub mod message;

pub use ingest::{IngestError, OrderIngestor};
pub use kafka::OrderConsumer;
pub use message::{OrderMessage, ValidationError};
