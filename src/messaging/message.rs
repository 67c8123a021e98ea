use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::order::{Address, Customer, Item, ItemStatus, Order, OrderItem, Payment};

// ============================================================================
// Inbound Order Event
// ============================================================================
//
// Wire shape of an order event. Missing fields take their zero value and
// are caught by `validate`.
//
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("order_uid is empty")]
    EmptyOrderId,

    #[error("customer_id is empty")]
    EmptyCustomerId,

    #[error("order contains no items")]
    NoItems,

    #[error("order contains no item with both chrt_id and rid")]
    NoValidItems,

    #[error("item {rid} has unknown status code {code}")]
    UnknownStatusCode { rid: Uuid, code: i64 },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrderMessage {
    pub order_uid: Uuid,
    pub track_number: String,
    pub entry: String,
    pub delivery: DeliveryMessage,
    pub payment: PaymentMessage,
    pub items: Vec<ItemMessage>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: Uuid,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i64,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeliveryMessage {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PaymentMessage {
    pub transaction: Uuid,
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

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ItemMessage {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: Uuid,
    pub name: String,
    pub sale: i64,
    pub size: String,
    pub total_price: i64,
    pub nm_id: Uuid,
    pub brand: String,
    pub status: i64,
}

impl OrderMessage {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_uid.is_nil() {
            return Err(ValidationError::EmptyOrderId);
        }
        if self.customer_id.is_nil() {
            return Err(ValidationError::EmptyCustomerId);
        }
        if self.items.is_empty() {
            return Err(ValidationError::NoItems);
        }
        if !self.items.iter().any(ItemMessage::is_identifiable) {
            return Err(ValidationError::NoValidItems);
        }
        // Only lines that will be kept need a known status
        if let Some(item) = self
            .items
            .iter()
            .filter(|item| item.is_identifiable())
            .find(|item| !ItemStatus::from_code(item.status).is_known())
        {
            return Err(ValidationError::UnknownStatusCode {
                rid: item.rid,
                code: item.status,
            });
        }
        Ok(())
    }

    /// Normalize into the aggregate. Delivery info is split into customer
    /// and address; each identifiable wire line becomes one order line of
    /// quantity 1. Lines without a catalog reference or line id are dropped.
    pub fn into_order(self) -> Order {
        let order_id = self.order_uid;
        let customer_id = self.customer_id;
        let delivery = self.delivery;
        let payment = self.payment;

        Order {
            id: order_id,
            track_number: self.track_number,
            entry: self.entry,
            items: self
                .items
                .into_iter()
                .filter(|item| {
                    let keep = item.is_identifiable();
                    if !keep {
                        tracing::warn!(
                            order_id = %order_id,
                            chrt_id = item.chrt_id,
                            rid = %item.rid,
                            "Dropping order line without catalog reference or line id"
                        );
                    }
                    keep
                })
                .map(|item| item.into_line(order_id))
                .collect(),
            locale: self.locale,
            internal_signature: self.internal_signature,
            delivery_service: self.delivery_service,
            sm_id: self.sm_id,
            created: self.date_created,
            customer: Customer {
                id: customer_id,
                name: delivery.name,
                email: delivery.email,
                phone: delivery.phone,
            },
            address: Address {
                id: Uuid::nil(),
                customer_id,
                zip: delivery.zip,
                city: delivery.city,
                address: delivery.address,
                region: delivery.region,
            },
            payment: Payment {
                id: Uuid::nil(),
                order_id,
                transaction_id: payment.transaction,
                request_id: payment.request_id,
                currency: payment.currency,
                provider: payment.provider,
                amount: payment.amount,
                timestamp: payment.payment_dt,
                bank: payment.bank,
                delivery_cost: payment.delivery_cost,
                goods_total: payment.goods_total,
                custom_fee: payment.custom_fee,
            },
        }
    }
}

impl ItemMessage {
    fn is_identifiable(&self) -> bool {
        self.chrt_id > 0 && !self.rid.is_nil()
    }

    fn into_line(self, order_id: Uuid) -> OrderItem {
        OrderItem {
            id: self.rid,
            order_id,
            item: Item {
                id: self.nm_id,
                name: self.name,
                brand: self.brand,
                price: self.price,
            },
            chrt_id: self.chrt_id,
            track_number: self.track_number,
            price: self.price,
            sale: self.sale,
            size: self.size,
            quantity: 1,
            total_price: self.total_price,
            status: ItemStatus::from_code(self.status),
            created: None,
        }
    }
}
