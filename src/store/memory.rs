use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::OrderRepository;
use crate::domain::order::aggregate::dedup_by_key;
use crate::domain::order::{
    Address, Customer, Item, ItemStatus, Order, OrderError, OrderFilter, OrderItem, Payment,
    Size,
};

// ============================================================================
// In-Memory Order Repository
// ============================================================================
//
// Test double applying the same merge rules as the SQL statements, with call
// counters and injectable failures.
//
// ============================================================================

#[derive(Clone)]
struct OrderRecord {
    customer_id: Uuid,
    address_id: Uuid,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    delivery_service: String,
    sm_id: i64,
    created: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    customers: HashMap<Uuid, Customer>,
    addresses: Vec<Address>,
    orders: HashMap<Uuid, OrderRecord>,
    payments: HashMap<Uuid, Payment>,
    items: HashMap<Uuid, Item>,
    sizes: HashMap<i64, Size>,
    lines: HashMap<Uuid, OrderItem>,
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    state: Mutex<State>,
    create_calls: AtomicUsize,
    line_item_calls: AtomicUsize,
    read_calls: AtomicUsize,
    fail_creates: AtomicUsize,
    fail_line_items: AtomicUsize,
    fail_reads: AtomicUsize,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn line_item_calls(&self) -> usize {
        self.line_item_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// The next `n` phase 1 writes fail with a pool timeout
    pub fn fail_next_creates(&self, n: usize) {
        self.fail_creates.store(n, Ordering::SeqCst);
    }

    /// The next `n` line item writes fail with a pool timeout
    pub fn fail_next_line_items(&self, n: usize) {
        self.fail_line_items.store(n, Ordering::SeqCst);
    }

    /// The next `n` reads fail with a pool timeout
    pub fn fail_next_reads(&self, n: usize) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    pub fn line_count(&self) -> usize {
        self.state.lock().unwrap().lines.len()
    }

    pub fn address_count(&self) -> usize {
        self.state.lock().unwrap().addresses.len()
    }

    pub fn stored_line(&self, rid: Uuid) -> Option<OrderItem> {
        self.state.lock().unwrap().lines.get(&rid).cloned()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn write_header(&self, order: &Order) {
        let mut state = self.state.lock().unwrap();

        state.customers.insert(order.customer.id, order.customer.clone());

        let address = match state
            .addresses
            .iter()
            .find(|a| a.dedup_key() == order.address.dedup_key())
        {
            Some(existing) => existing.clone(),
            None => {
                let address = Address {
                    id: Uuid::new_v4(),
                    ..order.address.clone()
                };
                state.addresses.push(address.clone());
                address
            }
        };

        // customer and address references are fixed by the first write
        let record = match state.orders.get(&order.id).cloned() {
            Some(mut stored) => {
                coalesce(&mut stored.track_number, &order.track_number);
                coalesce(&mut stored.delivery_service, &order.delivery_service);
                coalesce(&mut stored.internal_signature, &order.internal_signature);
                stored.sm_id = order.sm_id;
                stored
            }
            None => OrderRecord {
                customer_id: order.customer.id,
                address_id: address.id,
                track_number: order.track_number.clone(),
                entry: order.entry.clone(),
                locale: order.locale.clone(),
                internal_signature: order.internal_signature.clone(),
                delivery_service: order.delivery_service.clone(),
                sm_id: order.sm_id,
                created: order.created,
            },
        };
        state.orders.insert(order.id, record);

        let incoming = &order.payment;
        let payment = match state.payments.get(&order.id).cloned() {
            Some(stored) => Payment {
                transaction_id: incoming.transaction_id,
                request_id: incoming.request_id,
                currency: incoming.currency.clone(),
                provider: incoming.provider.clone(),
                timestamp: incoming.timestamp,
                bank: incoming.bank.clone(),
                ..stored
            },
            None => Payment {
                id: Uuid::new_v4(),
                order_id: order.id,
                ..incoming.clone()
            },
        };
        state.payments.insert(order.id, payment);

        for item in order.catalog_items() {
            state.items.insert(item.id, item);
        }
        for size in order.sizes() {
            state.sizes.insert(size.id, size);
        }
    }

    fn assemble(state: &State, order_id: Uuid, record: &OrderRecord) -> Option<Order> {
        let customer = state.customers.get(&record.customer_id)?.clone();
        let address = state.addresses.iter().find(|a| a.id == record.address_id)?.clone();
        let payment = state.payments.get(&order_id)?.clone();

        let mut items: Vec<OrderItem> = state
            .lines
            .values()
            .filter(|line| line.order_id == order_id)
            .filter_map(|line| {
                let size = state.sizes.get(&line.chrt_id)?;
                let item = state.items.get(&line.item.id)?;
                Some(OrderItem {
                    item: item.clone(),
                    size: size.size.clone(),
                    ..line.clone()
                })
            })
            .collect();
        items.sort_by_key(|line| (line.created, line.id));

        Some(Order {
            id: order_id,
            track_number: record.track_number.clone(),
            entry: record.entry.clone(),
            items,
            locale: record.locale.clone(),
            internal_signature: record.internal_signature.clone(),
            delivery_service: record.delivery_service.clone(),
            sm_id: record.sm_id,
            created: record.created,
            customer,
            address,
            payment,
        })
    }
}

fn coalesce(stored: &mut String, incoming: &str) {
    if !incoming.is_empty() {
        *stored = incoming.to_string();
    }
}

fn pool_timeout() -> OrderError {
    OrderError::Persistence(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<Order, OrderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fail_creates) {
            return Err(pool_timeout());
        }

        self.write_header(order);

        let lines: Vec<OrderItem> = order
            .items
            .iter()
            .cloned()
            .map(|mut line| {
                line.order_id = order.id;
                line
            })
            .collect();

        self.upsert_line_items(&lines)
            .await
            .map_err(|e| OrderError::LineItemsIncomplete {
                order_id: order.id,
                source: Box::new(e),
            })?;

        // Same result as the read path, without counting as a read
        let state = self.state.lock().unwrap();
        let stored = state
            .orders
            .get(&order.id)
            .and_then(|record| Self::assemble(&state, order.id, record));

        match stored {
            Some(stored) if !stored.items.is_empty() => Ok(stored),
            _ => Err(OrderError::ItemNotFound(order.id)),
        }
    }

    async fn upsert_line_items(&self, lines: &[OrderItem]) -> Result<Vec<OrderItem>, OrderError> {
        self.line_item_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fail_line_items) {
            return Err(pool_timeout());
        }

        let mut state = self.state.lock().unwrap();
        let mut persisted = Vec::new();

        for line in dedup_by_key(lines.iter().map(|l| (l.id, l.clone()))) {
            let stored = match state.lines.get(&line.id).cloned() {
                Some(mut stored) => {
                    if line.status.is_known() {
                        stored.status = line.status;
                    }
                    stored
                }
                None => OrderItem {
                    status: if line.status.is_known() {
                        line.status
                    } else {
                        ItemStatus::Pending
                    },
                    created: Some(Utc::now()),
                    ..line
                },
            };
            state.lines.insert(stored.id, stored.clone());
            persisted.push(stored);
        }

        Ok(persisted)
    }

    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fail_reads) {
            return Err(pool_timeout());
        }

        let state = self.state.lock().unwrap();

        let mut records: Vec<(&Uuid, &OrderRecord)> = state
            .orders
            .iter()
            .filter(|(id, _)| filter.order_id.map_or(true, |wanted| **id == wanted))
            .collect();
        if filter.recent {
            records.sort_by(|a, b| b.1.created.cmp(&a.1.created));
        }
        if let Some(limit) = filter.limit {
            records.truncate(limit as usize);
        }
        if records.is_empty() {
            return Err(OrderError::NotFound);
        }

        let mut orders = Vec::new();
        for (id, record) in records {
            match Self::assemble(&state, *id, record) {
                Some(order) if !order.items.is_empty() => orders.push(order),
                _ if filter.order_id.is_some() => return Err(OrderError::ItemNotFound(*id)),
                _ => {}
            }
        }

        Ok(orders)
    }
}

/// A fully populated order with a single delivered line
pub fn sample_order() -> Order {
    let customer_id = Uuid::new_v4();
    let order_id = Uuid::new_v4();
    let nm_id = Uuid::new_v4();

    Order {
        id: order_id,
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        items: vec![OrderItem {
            id: Uuid::new_v4(),
            order_id,
            item: Item {
                id: nm_id,
                name: "Mascaras".to_string(),
                brand: "Vivienne Sabo".to_string(),
                price: 453,
            },
            chrt_id: 9934930,
            track_number: "WBILMTESTTRACK".to_string(),
            price: 453,
            sale: 30,
            size: "0".to_string(),
            quantity: 1,
            total_price: 317,
            status: ItemStatus::Delivered,
            created: None,
        }],
        locale: "en".to_string(),
        internal_signature: "sig".to_string(),
        delivery_service: "meest".to_string(),
        sm_id: 99,
        created: Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap(),
        customer: Customer {
            id: customer_id,
            name: "Test Testov".to_string(),
            email: "test@gmail.com".to_string(),
            phone: "+9720000000".to_string(),
        },
        address: Address {
            id: Uuid::nil(),
            customer_id,
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
        },
        payment: Payment {
            id: Uuid::nil(),
            order_id,
            transaction_id: order_id,
            request_id: Uuid::new_v4(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            timestamp: 1637907727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_event_twice_is_idempotent() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();

        let first = repo.create_order(&order).await.unwrap();
        let second = repo.create_order(&order).await.unwrap();

        assert_eq!(repo.line_count(), 1);
        assert_eq!(repo.address_count(), 1);
        assert_eq!(first.address.id, second.address.id);
        assert_eq!(first.payment.id, second.payment.id);
        assert_eq!(repo.order(order.id).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_create_returns_address_the_order_points_at() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();
        repo.create_order(&order).await.unwrap();

        let mut moved = order.clone();
        moved.address.city = "Haifa".to_string();
        let persisted = repo.create_order(&moved).await.unwrap();

        assert_eq!(repo.address_count(), 2);
        assert_eq!(persisted.address.city, "Kiryat Mozkin");
        assert_eq!(persisted, repo.order(order.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_returns_lines_from_earlier_events() {
        let repo = InMemoryOrderRepository::new();
        let mut order = sample_order();
        let mut second = order.items[0].clone();
        second.id = Uuid::new_v4();
        order.items.push(second);
        repo.create_order(&order).await.unwrap();

        let mut resent = order.clone();
        resent.items.truncate(1);
        let persisted = repo.create_order(&resent).await.unwrap();

        assert_eq!(persisted.items.len(), 2);
        assert_eq!(persisted, repo.order(order.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_status_keeps_stored_status() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();
        repo.create_order(&order).await.unwrap();

        let mut line = order.items[0].clone();
        line.status = ItemStatus::Unknown(777);
        repo.upsert_line_items(&[line.clone()]).await.unwrap();

        let stored = repo.stored_line(line.id).unwrap();
        assert_eq!(stored.status, ItemStatus::Delivered);
    }

    #[tokio::test]
    async fn test_known_status_overwrites() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();
        repo.create_order(&order).await.unwrap();

        let mut line = order.items[0].clone();
        line.status = ItemStatus::Returned;
        line.price = 1;
        repo.upsert_line_items(&[line.clone()]).await.unwrap();

        let stored = repo.stored_line(line.id).unwrap();
        assert_eq!(stored.status, ItemStatus::Returned);
        assert_eq!(stored.price, 453);
    }

    #[tokio::test]
    async fn test_empty_strings_do_not_clobber_order_fields() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();
        repo.create_order(&order).await.unwrap();

        let mut update = order.clone();
        update.track_number = String::new();
        update.delivery_service = String::new();
        update.sm_id = 7;
        let persisted = repo.create_order(&update).await.unwrap();

        assert_eq!(persisted.track_number, "WBILMTESTTRACK");
        assert_eq!(persisted.delivery_service, "meest");
        assert_eq!(persisted.sm_id, 7);
    }

    #[tokio::test]
    async fn test_payment_amounts_are_write_once() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();
        repo.create_order(&order).await.unwrap();

        let mut update = order.clone();
        update.payment.amount = 1;
        update.payment.delivery_cost = 2;
        update.payment.bank = "sber".to_string();
        let persisted = repo.create_order(&update).await.unwrap();

        assert_eq!(persisted.payment.amount, 1817);
        assert_eq!(persisted.payment.delivery_cost, 1500);
        assert_eq!(persisted.payment.bank, "sber");
    }

    #[tokio::test]
    async fn test_failed_create_writes_nothing() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();
        repo.fail_next_creates(1);

        assert!(repo.create_order(&order).await.is_err());
        assert!(matches!(repo.order(order.id).await, Err(OrderError::NotFound)));
    }

    #[tokio::test]
    async fn test_line_item_failure_leaves_header_durable() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();
        repo.fail_next_line_items(1);

        let err = repo.create_order(&order).await.unwrap_err();
        assert!(matches!(err, OrderError::LineItemsIncomplete { .. }));
        assert!(matches!(
            repo.order(order.id).await,
            Err(OrderError::ItemNotFound(id)) if id == order.id
        ));

        repo.upsert_line_items(&order.items).await.unwrap();
        assert_eq!(repo.order(order.id).await.unwrap().items.len(), 1);
    }
}
