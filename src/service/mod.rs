use std::sync::Arc;
use uuid::Uuid;

use crate::cache::LruCache;
use crate::domain::order::{Order, OrderError, OrderFilter, OrderItem};
use crate::metrics::Metrics;
use crate::store::OrderRepository;

// ============================================================================
// Order Service
// ============================================================================
//
// Cache-aside reads and write-through refresh:
//
//   order(id)       → cache hit, or store read → cache set
//   process_order   → store write → cache set with the persisted value
//   warm_up_cache   → most recent N from the store → cache set
//
// ============================================================================

pub struct OrderService {
    repository: Arc<dyn OrderRepository>,
    cache: Arc<LruCache<Order>>,
    metrics: Arc<Metrics>,
    warm_up_limit: u64,
}

impl OrderService {
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        cache: Arc<LruCache<Order>>,
        metrics: Arc<Metrics>,
        warm_up_limit: u64,
    ) -> Self {
        Self {
            repository,
            cache,
            metrics,
            warm_up_limit,
        }
    }

    pub async fn order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let key = order_id.to_string();

        if let Some(order) = self.cache.get(&key) {
            tracing::debug!(order_id = %order_id, "Cache hit");
            self.metrics.record_cache_lookup(true);
            return Ok(order);
        }

        tracing::debug!(order_id = %order_id, "Cache miss, reading store");
        self.metrics.record_cache_lookup(false);

        let order = self.repository.order(order_id).await?;
        self.remember(&order);
        Ok(order)
    }

    /// Persist the aggregate and refresh its cache entry
    pub async fn process_order(&self, order: &Order) -> Result<Order, OrderError> {
        let persisted = self.repository.create_order(order).await?;
        self.remember(&persisted);
        Ok(persisted)
    }

    /// Re-run only the line item write for an order whose header is already
    /// durable, then refresh the cache from the store.
    pub async fn resume_line_items(
        &self,
        order_id: Uuid,
        lines: &[OrderItem],
    ) -> Result<Order, OrderError> {
        let lines: Vec<OrderItem> = lines
            .iter()
            .cloned()
            .map(|mut line| {
                line.order_id = order_id;
                line
            })
            .collect();

        self.repository.upsert_line_items(&lines).await?;

        let order = self.repository.order(order_id).await?;
        self.remember(&order);
        tracing::info!(order_id = %order_id, lines = lines.len(), "Line items resumed");
        Ok(order)
    }

    /// Load the most recent orders into the cache. An empty store warms nothing.
    pub async fn warm_up_cache(&self) -> Result<usize, OrderError> {
        let orders = match self
            .repository
            .orders(&OrderFilter::most_recent(self.warm_up_limit))
            .await
        {
            Ok(orders) => orders,
            Err(OrderError::NotFound) => Vec::new(),
            Err(e) => return Err(e),
        };

        for order in &orders {
            self.remember(order);
        }

        tracing::info!(orders = orders.len(), limit = self.warm_up_limit, "Cache warmed up");
        Ok(orders.len())
    }

    fn remember(&self, order: &Order) {
        self.cache.set(order.cache_key(), order.clone());
        self.metrics.set_cache_entries(self.cache.len());
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
