use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

use super::message::{OrderMessage, ValidationError};
use crate::domain::order::{Order, OrderError};
use crate::metrics::Metrics;
use crate::service::OrderService;
use crate::utils::{retry_on_transient, retry_with_backoff, IsTransient, RetryConfig};

// ============================================================================
// Ingestion Pipeline
// ============================================================================
//
//   received → parsed → validated → persisted → acknowledged
//                 │          │           │
//                 └──────────┴───────────┴──→ logged, not acknowledged
//
// Acknowledgment belongs to the consumer; this stage only reports whether
// the message made it to the store.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed order message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid order message: {0}")]
    Invalid(#[from] ValidationError),

    #[error("failed to persist order {order_id}: {source}")]
    Persistence {
        order_id: Uuid,
        #[source]
        source: OrderError,
    },
}

impl IngestError {
    /// Metrics label for the stage that stopped the message
    pub fn stage(&self) -> &'static str {
        match self {
            IngestError::Malformed(_) => "parse",
            IngestError::Invalid(_) => "validate",
            IngestError::Persistence { .. } => "persist",
        }
    }

    /// Malformed and invalid messages will never succeed on redelivery
    pub fn is_rejection(&self) -> bool {
        !matches!(self, IngestError::Persistence { .. })
    }
}

pub struct OrderIngestor {
    service: Arc<OrderService>,
    metrics: Arc<Metrics>,
    retry: RetryConfig,
}

impl OrderIngestor {
    pub fn new(service: Arc<OrderService>, metrics: Arc<Metrics>, retry: RetryConfig) -> Self {
        Self {
            service,
            metrics,
            retry,
        }
    }

    /// Run one raw message through the pipeline. `Ok` means the aggregate is
    /// durable and the message may be acknowledged.
    pub async fn handle_payload(&self, payload: &[u8]) -> Result<Order, IngestError> {
        self.metrics.messages_received.inc();

        let order = match self.decode(payload) {
            Ok(order) => order,
            Err(e) => {
                self.metrics.record_rejected(e.stage());
                tracing::error!(stage = e.stage(), error = %e, "Skipping order message");
                return Err(e);
            }
        };

        let started = Instant::now();
        let result = self.persist(&order).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(persisted) => {
                self.metrics.record_persist(elapsed, true);
                tracing::info!(
                    order_id = %persisted.id,
                    items = persisted.items.len(),
                    "Order persisted"
                );
                Ok(persisted)
            }
            Err(source) => {
                self.metrics.record_persist(elapsed, false);
                self.metrics.record_failed(failure_reason(&source));
                tracing::error!(order_id = %order.id, error = %source, "Order not persisted");
                Err(IngestError::Persistence {
                    order_id: order.id,
                    source,
                })
            }
        }
    }

    fn decode(&self, payload: &[u8]) -> Result<Order, IngestError> {
        let message = OrderMessage::parse(payload)?;
        message.validate()?;
        Ok(message.into_order())
    }

    /// Store write with backoff on transient errors. When only the line items
    /// failed, the retry covers the line items alone.
    async fn persist(&self, order: &Order) -> Result<Order, OrderError> {
        let service = self.service.as_ref();

        let first = retry_on_transient(self.retry.clone(), move |_| service.process_order(order))
            .await
            .into_result();

        match first {
            Err(OrderError::LineItemsIncomplete { order_id, source }) => {
                tracing::warn!(
                    order_id = %order_id,
                    error = %source,
                    "Order header stored, retrying line items"
                );
                retry_with_backoff(self.retry.clone(), move |_| {
                    service.resume_line_items(order_id, &order.items)
                })
                .await
                .into_result()
            }
            other => other,
        }
    }
}

fn failure_reason(error: &OrderError) -> &'static str {
    match error {
        OrderError::LineItemsIncomplete { .. } => "line_items",
        e if e.is_transient() => "retries_exhausted",
        _ => "permanent",
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
