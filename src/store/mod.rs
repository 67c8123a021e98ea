// ============================================================================
// Persistence Engine
// ============================================================================
//
// Maps the order aggregate onto the relational schema in `migrations/`:
//
//   customer ─┬─ address
//             └─ "order" ─┬─ payment
//                         └─ order_item ─┬─ item
//                                        └─ size
//
// Writes happen in two phases:
//   1. customer, address, order, payment, item, size in one transaction
//   2. order_item rows, after commit, keyed by line id
//
// Phase 2 is idempotent and can be re-run on its own.
//
// ============================================================================

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::order::{Order, OrderError, OrderFilter, OrderItem};

mod postgres;
mod rows;
#[cfg(test)]
pub mod memory;

pub use postgres::PgOrderRepository;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Upsert the whole aggregate (both phases) and return the persisted state
    async fn create_order(&self, order: &Order) -> Result<Order, OrderError>;

    /// Phase 2 on its own: upsert line items keyed by line id
    async fn upsert_line_items(&self, lines: &[OrderItem]) -> Result<Vec<OrderItem>, OrderError>;

    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError>;

    /// First order matching the id, with its line items
    async fn order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.orders(&OrderFilter::by_id(order_id))
            .await?
            .into_iter()
            .next()
            .ok_or(OrderError::NotFound)
    }
}

pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}
