use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::order::{Address, Customer, Order, OrderItem, Payment};

// ============================================================================
// JSON Projection
// ============================================================================
//
// Outbound shape of an order, mirroring the inbound event: delivery is
// re-assembled from customer and address, statuses are labels.
//
// ============================================================================

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub track_number: String,
    pub entry: String,
    pub delivery: DeliveryResponse,
    pub payment: PaymentResponse,
    pub items: Vec<ItemResponse>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: Uuid,
    pub delivery_service: String,
    pub sm_id: i64,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
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

#[derive(Debug, Serialize)]
pub struct ItemResponse {
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
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub reason: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            track_number: order.track_number,
            entry: order.entry,
            delivery: DeliveryResponse::new(&order.customer, order.address),
            payment: order.payment.into(),
            items: order.items.into_iter().map(ItemResponse::from).collect(),
            locale: order.locale,
            internal_signature: order.internal_signature,
            customer_id: order.customer.id,
            delivery_service: order.delivery_service,
            sm_id: order.sm_id,
            date_created: order.created,
        }
    }
}

impl DeliveryResponse {
    fn new(customer: &Customer, address: Address) -> Self {
        Self {
            name: customer.name.clone(),
            phone: customer.phone.clone(),
            zip: address.zip,
            city: address.city,
            address: address.address,
            region: address.region,
            email: customer.email.clone(),
        }
    }
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            transaction: payment.transaction_id,
            request_id: payment.request_id,
            currency: payment.currency,
            provider: payment.provider,
            amount: payment.amount,
            payment_dt: payment.timestamp,
            bank: payment.bank,
            delivery_cost: payment.delivery_cost,
            goods_total: payment.goods_total,
            custom_fee: payment.custom_fee,
        }
    }
}

impl From<OrderItem> for ItemResponse {
    fn from(line: OrderItem) -> Self {
        Self {
            chrt_id: line.chrt_id,
            track_number: line.track_number,
            price: line.price,
            rid: line.id,
            name: line.item.name,
            sale: line.sale,
            size: line.size,
            total_price: line.total_price,
            nm_id: line.item.id,
            brand: line.item.brand,
            status: line.status.as_str().to_string(),
        }
    }
}
