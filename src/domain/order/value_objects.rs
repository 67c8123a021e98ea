use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Delivery address. Deduplicated per customer on the full
/// (customer, zip, city, address, region) tuple and never updated.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Address {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
}

impl Address {
    /// Tuple the store uses to decide whether an address already exists
    pub fn dedup_key(&self) -> (Uuid, &str, &str, &str, &str) {
        (self.customer_id, &self.zip, &self.city, &self.address, &self.region)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub transaction_id: Uuid,
    pub request_id: Uuid,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Unix seconds
    pub timestamp: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

/// Catalog item, keyed by its business id (`nm_id`) and shared across orders.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    pub price: i64,
}

/// Size row keyed by the catalog reference (`chrt_id`) of an order line.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Size {
    pub id: i64,
    pub item_id: Uuid,
    pub size: String,
    pub price: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderItem {
    /// Line identifier (`rid`)
    pub id: Uuid,
    pub order_id: Uuid,
    pub item: Item,
    /// Catalog reference (`chrt_id`)
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub sale: i64,
    pub size: String,
    pub quantity: i64,
    pub total_price: i64,
    pub status: ItemStatus,
    pub created: Option<DateTime<Utc>>,
}

impl OrderItem {
    pub fn size_row(&self) -> Size {
        Size {
            id: self.chrt_id,
            item_id: self.item.id,
            size: self.size.clone(),
            price: self.price,
        }
    }
}

// ============================================================================
// Item Status
// ============================================================================

/// Line item status.
///
/// Inbound events carry numeric codes; codes outside the mapping table are
/// kept as `Unknown(code)` so the ingestion stage can reject them explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Assembling,
    InTransit,
    Delivered,
    Cancelled,
    Returned,
    Unknown(i64),
}

impl ItemStatus {
    /// Every status the store accepts
    pub const KNOWN: [ItemStatus; 7] = [
        ItemStatus::Pending,
        ItemStatus::Processing,
        ItemStatus::Assembling,
        ItemStatus::InTransit,
        ItemStatus::Delivered,
        ItemStatus::Cancelled,
        ItemStatus::Returned,
    ];

    pub fn from_code(code: i64) -> Self {
        match code {
            100 => ItemStatus::Pending,
            200 => ItemStatus::Processing,
            202 => ItemStatus::Delivered,
            300 => ItemStatus::Assembling,
            400 => ItemStatus::InTransit,
            500 => ItemStatus::Cancelled,
            600 => ItemStatus::Returned,
            other => ItemStatus::Unknown(other),
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::KNOWN.into_iter().find(|status| status.as_str() == label)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Assembling => "assembling",
            ItemStatus::InTransit => "in_transit",
            ItemStatus::Delivered => "delivered",
            ItemStatus::Cancelled => "cancelled",
            ItemStatus::Returned => "returned",
            ItemStatus::Unknown(_) => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ItemStatus::Unknown(_))
    }

    pub fn known_labels() -> Vec<String> {
        Self::KNOWN.iter().map(|s| s.as_str().to_string()).collect()
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Unknown(code) => write!(f, "unknown({})", code),
            status => f.write_str(status.as_str()),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
