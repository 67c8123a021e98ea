use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::value_objects::{Address, Customer, Item, OrderItem, Payment, Size};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// The full order graph treated as one consistency unit:
//
//   Order ── Customer
//         ── Address
//         ── Payment
//         ── OrderItem* ── Item
//                       ── Size
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub track_number: String,
    pub entry: String,
    pub items: Vec<OrderItem>,
    pub locale: String,
    pub internal_signature: String,
    pub delivery_service: String,
    pub sm_id: i64,
    pub created: DateTime<Utc>,

    pub customer: Customer,
    pub address: Address,
    pub payment: Payment,
}

impl Order {
    pub fn cache_key(&self) -> String {
        self.id.to_string()
    }

    /// Catalog items referenced by the lines, one per business id.
    /// A later line wins when two lines disagree about the same item.
    pub fn catalog_items(&self) -> Vec<Item> {
        dedup_by_key(self.items.iter().map(|line| (line.item.id, line.item.clone())))
    }

    /// Size rows referenced by the lines, one per catalog reference
    pub fn sizes(&self) -> Vec<Size> {
        dedup_by_key(self.items.iter().map(|line| (line.chrt_id, line.size_row())))
    }
}

/// Keep the last value per key, preserving first-seen key order.
/// Batch upserts cannot touch the same conflict key twice in one statement.
pub(crate) fn dedup_by_key<K, V>(pairs: impl Iterator<Item = (K, V)>) -> Vec<V>
where
    K: std::hash::Hash + Eq,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut values: Vec<V> = Vec::new();

    for (key, value) in pairs {
        match positions.get(&key) {
            Some(&idx) => values[idx] = value,
            None => {
                positions.insert(key, values.len());
                values.push(value);
            }
        }
    }

    values
}

// ============================================================================
// Read Filter
// ============================================================================

/// Read-side filter for the persistence engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub order_id: Option<Uuid>,
    /// Order by creation time, newest first
    pub recent: bool,
    pub limit: Option<u64>,
}

impl OrderFilter {
    pub fn by_id(order_id: Uuid) -> Self {
        Self {
            order_id: Some(order_id),
            ..Self::default()
        }
    }

    pub fn most_recent(limit: u64) -> Self {
        Self {
            order_id: None,
            recent: true,
            limit: Some(limit),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
