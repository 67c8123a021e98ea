use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::order::{Address, Customer, Item, ItemStatus, Order, OrderItem, Payment};

// ============================================================================
// Row Types
// ============================================================================
//
// One struct per RETURNING / SELECT shape, converted into domain values.
//
// ============================================================================

/// `order_item` columns returned by the line item upsert. Only the catalog
/// references are known here; names and sizes come from the read path.
#[derive(sqlx::FromRow)]
pub(super) struct OrderItemRow {
    pub rid: Uuid,
    pub order_id: Uuid,
    pub nm_id: Uuid,
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub sale: i64,
    pub quantity: i64,
    pub total_price: i64,
    pub status: String,
    pub created: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.rid,
            order_id: row.order_id,
            item: Item {
                id: row.nm_id,
                ..Item::default()
            },
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            sale: row.sale,
            size: String::new(),
            quantity: row.quantity,
            total_price: row.total_price,
            status: stored_status(row.rid, &row.status),
            created: Some(row.created),
        }
    }
}

// ============================================================================
// Read Model Rows
// ============================================================================

/// Order joined with customer, address and payment
#[derive(sqlx::FromRow)]
pub(super) struct OrderViewRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub address_id: Uuid,
    pub track_number: String,
    pub entry: String,
    pub locale: String,
    pub internal_signature: String,
    pub delivery_service: String,
    pub sm_id: i64,
    pub created: DateTime<Utc>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub payment_id: Uuid,
    pub transaction_id: Uuid,
    pub request_id: Uuid,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

impl From<OrderViewRow> for Order {
    fn from(row: OrderViewRow) -> Self {
        Order {
            id: row.id,
            track_number: row.track_number,
            entry: row.entry,
            items: Vec::new(),
            locale: row.locale,
            internal_signature: row.internal_signature,
            delivery_service: row.delivery_service,
            sm_id: row.sm_id,
            created: row.created,
            customer: Customer {
                id: row.customer_id,
                name: row.customer_name,
                email: row.customer_email,
                phone: row.customer_phone,
            },
            address: Address {
                id: row.address_id,
                customer_id: row.customer_id,
                zip: row.zip,
                city: row.city,
                address: row.address,
                region: row.region,
            },
            payment: Payment {
                id: row.payment_id,
                order_id: row.id,
                transaction_id: row.transaction_id,
                request_id: row.request_id,
                currency: row.currency,
                provider: row.provider,
                amount: row.amount,
                timestamp: row.payment_dt,
                bank: row.bank,
                delivery_cost: row.delivery_cost,
                goods_total: row.goods_total,
                custom_fee: row.custom_fee,
            },
        }
    }
}

/// Line item joined with its size and catalog item
#[derive(sqlx::FromRow)]
pub(super) struct OrderItemViewRow {
    pub rid: Uuid,
    pub order_id: Uuid,
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub sale: i64,
    pub quantity: i64,
    pub total_price: i64,
    pub status: String,
    pub created: DateTime<Utc>,
    pub size: String,
    pub nm_id: Uuid,
    pub name: String,
    pub brand: String,
    pub item_price: i64,
}

impl From<OrderItemViewRow> for OrderItem {
    fn from(row: OrderItemViewRow) -> Self {
        OrderItem {
            id: row.rid,
            order_id: row.order_id,
            item: Item {
                id: row.nm_id,
                name: row.name,
                brand: row.brand,
                price: row.item_price,
            },
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            sale: row.sale,
            size: row.size,
            quantity: row.quantity,
            total_price: row.total_price,
            status: stored_status(row.rid, &row.status),
            created: Some(row.created),
        }
    }
}

fn stored_status(rid: Uuid, label: &str) -> ItemStatus {
    ItemStatus::from_label(label).unwrap_or_else(|| {
        tracing::warn!(rid = %rid, status = %label, "Stored line item has an unrecognised status");
        ItemStatus::Unknown(0)
    })
}

// ============================================================================
// Unit Tests
// ============================================================================
