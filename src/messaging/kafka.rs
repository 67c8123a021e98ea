use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::Message;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::ingest::OrderIngestor;
use crate::config::KafkaConfig;
use crate::health::{self, HealthRegistry, HealthStatus};
use crate::metrics::Metrics;

// ============================================================================
// Order Stream Consumer
// ============================================================================
//
// At-least-once: an offset is committed only after the order it carries is
// durable. Anything else stays uncommitted and is redelivered after a
// restart or rebalance unless a later offset on the partition is committed.
//
// ============================================================================

pub struct OrderConsumer {
    consumer: StreamConsumer,
    topics: Vec<String>,
    ingestor: Arc<OrderIngestor>,
    health: Arc<HealthRegistry>,
    metrics: Arc<Metrics>,
}

impl OrderConsumer {
    pub fn new(
        config: &KafkaConfig,
        ingestor: Arc<OrderIngestor>,
        health: Arc<HealthRegistry>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics)?;

        tracing::info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            topics = ?config.topics,
            "Subscribed to order topics"
        );

        Ok(Self {
            consumer,
            topics: config.topics.clone(),
            ingestor,
            health,
            metrics,
        })
    }

    /// Consume until the stream ends or `shutdown` fires. A message already
    /// being processed is finished first.
    pub async fn run(self, shutdown: CancellationToken) {
        self.health.update(
            health::CONSUMER,
            HealthStatus::Healthy,
            Some(format!("consuming {}", self.topics.join(","))),
        );

        let mut stream = self.consumer.stream();

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Order consumer shutting down");
                    break;
                }
                next = stream.next() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Kafka receive error");
                    self.health.update(
                        health::CONSUMER,
                        HealthStatus::Degraded(e.to_string()),
                        None,
                    );
                    continue;
                }
                None => {
                    tracing::warn!("Order stream ended");
                    break;
                }
            };

            tracing::info!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                "Received order message"
            );

            // Failures are logged by the pipeline; the offset stays uncommitted
            let payload = message.payload().unwrap_or_default();
            if let Err(e) = self.ingestor.handle_payload(payload).await {
                if e.is_rejection() {
                    tracing::debug!(
                        partition = message.partition(),
                        offset = message.offset(),
                        "Rejected message skipped"
                    );
                } else {
                    self.health.update(
                        health::CONSUMER,
                        HealthStatus::Degraded(e.to_string()),
                        None,
                    );
                }
                continue;
            }

            match self.consumer.commit_message(&message, CommitMode::Async) {
                Ok(()) => {
                    self.metrics.offsets_committed.inc();
                    self.health.update(health::CONSUMER, HealthStatus::Healthy, None);
                }
                Err(e) => {
                    tracing::warn!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        error = %e,
                        "Offset commit failed"
                    );
                }
            }
        }

        drop(stream);
        self.consumer.unsubscribe();
        self.health.update(
            health::CONSUMER,
            HealthStatus::Unhealthy("stopped".to_string()),
            None,
        );
    }
}
