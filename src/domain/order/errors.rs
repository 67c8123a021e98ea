use uuid::Uuid;

use crate::utils::IsTransient;

// ============================================================================
// Order Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order not found")]
    NotFound,

    #[error("item not found for order {0}")]
    ItemNotFound(Uuid),

    /// Phase 1 committed but the line items did not land. Re-running the
    /// line item upsert alone is safe.
    #[error("line items for order {order_id} were not fully written: {source}")]
    LineItemsIncomplete {
        order_id: Uuid,
        #[source]
        source: Box<OrderError>,
    },

    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        match self {
            OrderError::Persistence(err) => match err {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::WorkerCrashed => true,
                // serialization_failure / deadlock_detected
                sqlx::Error::Database(db) => {
                    matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
                }
                _ => false,
            },
            // Handled by re-running phase 2 only
            OrderError::LineItemsIncomplete { .. } => false,
            OrderError::NotFound | OrderError::ItemNotFound(_) => false,
        }
    }
}
