use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use super::rows::{OrderItemRow, OrderItemViewRow, OrderViewRow};
use super::OrderRepository;
use crate::domain::order::aggregate::dedup_by_key;
use crate::domain::order::{
    Address, Customer, Item, ItemStatus, Order, OrderError, OrderFilter, OrderItem, Payment,
    Size,
};

// ============================================================================
// PostgreSQL Order Repository
// ============================================================================

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<Order, OrderError> {
        // Phase 1: everything except the line items
        let mut tx = self.pool.begin().await?;

        let customer_id = upsert_customer(&mut tx, &order.customer).await?;
        let address_id = upsert_address(&mut tx, &order.address).await?;
        upsert_order(&mut tx, order, customer_id, address_id).await?;
        upsert_payment(&mut tx, order.id, &order.payment).await?;
        let items = upsert_items(&mut tx, &order.catalog_items()).await?;
        let sizes = upsert_sizes(&mut tx, &order.sizes()).await?;

        tx.commit().await?;

        tracing::debug!(
            order_id = %order.id,
            items,
            sizes,
            "Order header committed"
        );

        // Phase 2: line items, outside the transaction
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

        // Stored aggregate: the address the order references, every stored line
        self.order(order.id).await
    }

    async fn upsert_line_items(&self, lines: &[OrderItem]) -> Result<Vec<OrderItem>, OrderError> {
        let (known, unknown) = partition_lines(lines);
        let mut persisted = Vec::with_capacity(known.len() + unknown.len());

        if !known.is_empty() {
            let statuses: Vec<String> = known.iter().map(|l| l.status.as_str().to_string()).collect();
            let rows = insert_lines(&self.pool, &known, statuses, OnConflict::GuardStatus).await?;
            persisted.extend(rows);
        }

        if !unknown.is_empty() {
            tracing::warn!(
                lines = unknown.len(),
                "Line items with unrecognised status keep their stored status"
            );
            let statuses = vec![ItemStatus::Pending.as_str().to_string(); unknown.len()];
            let rows = insert_lines(&self.pool, &unknown, statuses, OnConflict::KeepStatus).await?;
            persisted.extend(rows);
        }

        Ok(persisted)
    }

    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError> {
        let mut tx = self.pool.begin().await?;

        let mut query = QueryBuilder::<Postgres>::new(ORDER_VIEW_SELECT);
        if let Some(order_id) = filter.order_id {
            query.push(" WHERE o.id = ").push_bind(order_id);
        }
        if filter.recent {
            query.push(" ORDER BY o.created DESC");
        }
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit_param(limit));
        }

        let rows: Vec<OrderViewRow> = query.build_query_as().fetch_all(&mut *tx).await?;
        if rows.is_empty() {
            return Err(OrderError::NotFound);
        }

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let line_rows: Vec<OrderItemViewRow> = sqlx::query_as(ORDER_ITEM_VIEW_SELECT)
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut lines_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in line_rows {
            lines_by_order
                .entry(row.order_id)
                .or_default()
                .push(OrderItem::from(row));
        }

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let mut order = Order::from(row);
            match lines_by_order.remove(&order.id) {
                Some(lines) => {
                    order.items = lines;
                    orders.push(order);
                }
                None if filter.order_id.is_some() => {
                    return Err(OrderError::ItemNotFound(order.id));
                }
                None => {
                    tracing::warn!(order_id = %order.id, "Order has no line items, skipping");
                }
            }
        }

        Ok(orders)
    }
}

// ============================================================================
// Phase 1 Statements
// ============================================================================

async fn upsert_customer(
    tx: &mut Transaction<'_, Postgres>,
    customer: &Customer,
) -> Result<Uuid, OrderError> {
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO customer (id, name, email, phone)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            email = EXCLUDED.email,
            phone = EXCLUDED.phone
        RETURNING id
        "#,
    )
    .bind(customer.id)
    .bind(&customer.name)
    .bind(&customer.email)
    .bind(&customer.phone)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

/// Insert the address unless the customer already has an identical one and
/// return the row id either way. The no-op update makes a concurrent insert
/// of the same address wait for the winner and return its row.
async fn upsert_address(
    tx: &mut Transaction<'_, Postgres>,
    address: &Address,
) -> Result<Uuid, OrderError> {
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO address (customer_id, zip, city, address, region)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (customer_id, zip, city, address, region) DO UPDATE SET
            customer_id = EXCLUDED.customer_id
        RETURNING id
        "#,
    )
    .bind(address.customer_id)
    .bind(&address.zip)
    .bind(&address.city)
    .bind(&address.address)
    .bind(&address.region)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

/// The customer and address an order points at are fixed by its first write
async fn upsert_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
    customer_id: Uuid,
    address_id: Uuid,
) -> Result<(), OrderError> {
    sqlx::query(
        r#"
        INSERT INTO "order" (id, customer_id, address_id, track_number, entry,
                             locale, internal_signature, delivery_service, sm_id, created)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            track_number = COALESCE(NULLIF(EXCLUDED.track_number, ''), "order".track_number),
            delivery_service = COALESCE(NULLIF(EXCLUDED.delivery_service, ''), "order".delivery_service),
            internal_signature = COALESCE(NULLIF(EXCLUDED.internal_signature, ''), "order".internal_signature),
            sm_id = EXCLUDED.sm_id
        "#,
    )
    .bind(order.id)
    .bind(customer_id)
    .bind(address_id)
    .bind(&order.track_number)
    .bind(&order.entry)
    .bind(&order.locale)
    .bind(&order.internal_signature)
    .bind(&order.delivery_service)
    .bind(order.sm_id)
    .bind(order.created)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Amount and cost fields are kept from the first write
async fn upsert_payment(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    payment: &Payment,
) -> Result<(), OrderError> {
    sqlx::query(
        r#"
        INSERT INTO payment (order_id, transaction_id, request_id, currency, provider,
                             amount, payment_dt, bank, delivery_cost, goods_total, custom_fee)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (order_id) DO UPDATE SET
            transaction_id = EXCLUDED.transaction_id,
            request_id = EXCLUDED.request_id,
            currency = EXCLUDED.currency,
            provider = EXCLUDED.provider,
            payment_dt = EXCLUDED.payment_dt,
            bank = EXCLUDED.bank
        "#,
    )
    .bind(order_id)
    .bind(payment.transaction_id)
    .bind(payment.request_id)
    .bind(&payment.currency)
    .bind(&payment.provider)
    .bind(payment.amount)
    .bind(payment.timestamp)
    .bind(&payment.bank)
    .bind(payment.delivery_cost)
    .bind(payment.goods_total)
    .bind(payment.custom_fee)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_items(tx: &mut Transaction<'_, Postgres>, items: &[Item]) -> Result<u64, OrderError> {
    if items.is_empty() {
        return Ok(0);
    }

    let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
    let names: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
    let brands: Vec<String> = items.iter().map(|i| i.brand.clone()).collect();
    let prices: Vec<i64> = items.iter().map(|i| i.price).collect();

    let result = sqlx::query(
        r#"
        INSERT INTO item (nm_id, name, brand, price)
        SELECT * FROM UNNEST($1::uuid[], $2::text[], $3::text[], $4::bigint[])
        ON CONFLICT (nm_id) DO UPDATE SET
            name = EXCLUDED.name,
            brand = EXCLUDED.brand,
            price = EXCLUDED.price
        "#,
    )
    .bind(&ids)
    .bind(&names)
    .bind(&brands)
    .bind(&prices)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

async fn upsert_sizes(tx: &mut Transaction<'_, Postgres>, sizes: &[Size]) -> Result<u64, OrderError> {
    if sizes.is_empty() {
        return Ok(0);
    }

    let ids: Vec<i64> = sizes.iter().map(|s| s.id).collect();
    let item_ids: Vec<Uuid> = sizes.iter().map(|s| s.item_id).collect();
    let labels: Vec<String> = sizes.iter().map(|s| s.size.clone()).collect();
    let prices: Vec<i64> = sizes.iter().map(|s| s.price).collect();

    let result = sqlx::query(
        r#"
        INSERT INTO size (id, nm_id, tech_size, price)
        SELECT * FROM UNNEST($1::bigint[], $2::uuid[], $3::text[], $4::bigint[])
        ON CONFLICT (id) DO UPDATE SET
            nm_id = EXCLUDED.nm_id,
            tech_size = EXCLUDED.tech_size,
            price = EXCLUDED.price
        "#,
    )
    .bind(&ids)
    .bind(&item_ids)
    .bind(&labels)
    .bind(&prices)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

// ============================================================================
// Phase 2 Statements
// ============================================================================

/// What an existing line keeps when its rid is written again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnConflict {
    /// Take the incoming status if it is in the accepted set
    GuardStatus,
    /// Leave the stored status alone
    KeepStatus,
}

impl OnConflict {
    fn clause(self) -> &'static str {
        match self {
            OnConflict::GuardStatus => {
                r#"ON CONFLICT (rid) DO UPDATE SET
            status = CASE
                WHEN EXCLUDED.status = ANY($11::text[]) THEN EXCLUDED.status
                ELSE order_item.status
            END"#
            }
            // No-op update so the existing row is still returned
            OnConflict::KeepStatus => "ON CONFLICT (rid) DO UPDATE SET status = order_item.status",
        }
    }
}

async fn insert_lines(
    pool: &PgPool,
    lines: &[OrderItem],
    statuses: Vec<String>,
    on_conflict: OnConflict,
) -> Result<Vec<OrderItem>, OrderError> {
    let rids: Vec<Uuid> = lines.iter().map(|l| l.id).collect();
    let order_ids: Vec<Uuid> = lines.iter().map(|l| l.order_id).collect();
    let nm_ids: Vec<Uuid> = lines.iter().map(|l| l.item.id).collect();
    let chrt_ids: Vec<i64> = lines.iter().map(|l| l.chrt_id).collect();
    let track_numbers: Vec<String> = lines.iter().map(|l| l.track_number.clone()).collect();
    let prices: Vec<i64> = lines.iter().map(|l| l.price).collect();
    let sales: Vec<i64> = lines.iter().map(|l| l.sale).collect();
    let quantities: Vec<i64> = lines.iter().map(|l| l.quantity).collect();
    let totals: Vec<i64> = lines.iter().map(|l| l.total_price).collect();

    let sql = format!(
        r#"
        INSERT INTO order_item (rid, order_id, nm_id, chrt_id, track_number,
                                price, sale, quantity, total_price, status)
        SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::bigint[], $5::text[],
                             $6::bigint[], $7::bigint[], $8::bigint[], $9::bigint[], $10::text[])
        {}
        RETURNING rid, order_id, nm_id, chrt_id, track_number, price, sale, quantity,
                  total_price, status, created
        "#,
        on_conflict.clause()
    );

    let mut query = sqlx::query_as::<_, OrderItemRow>(&sql)
        .bind(&rids)
        .bind(&order_ids)
        .bind(&nm_ids)
        .bind(&chrt_ids)
        .bind(&track_numbers)
        .bind(&prices)
        .bind(&sales)
        .bind(&quantities)
        .bind(&totals)
        .bind(&statuses);

    if on_conflict == OnConflict::GuardStatus {
        query = query.bind(ItemStatus::known_labels());
    }

    let rows = query.fetch_all(pool).await?;

    Ok(rows.into_iter().map(OrderItem::from).collect())
}

/// One line per rid (last wins), split into lines whose status the store
/// accepts and lines whose status must not reach it.
fn partition_lines(lines: &[OrderItem]) -> (Vec<OrderItem>, Vec<OrderItem>) {
    dedup_by_key(lines.iter().map(|line| (line.id, line.clone())))
        .into_iter()
        .partition(|line| line.status.is_known())
}

fn limit_param(limit: u64) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ============================================================================
// Read Queries
// ============================================================================

const ORDER_VIEW_SELECT: &str = r#"
    SELECT
        o.id, o.customer_id, o.address_id, o.track_number, o.entry, o.locale,
        o.internal_signature, o.delivery_service, o.sm_id, o.created,
        c.name AS customer_name, c.email AS customer_email, c.phone AS customer_phone,
        a.zip, a.city, a.address, a.region,
        p.id AS payment_id, p.transaction_id, p.request_id, p.currency, p.provider,
        p.amount, p.payment_dt, p.bank, p.delivery_cost, p.goods_total, p.custom_fee
    FROM "order" o
    JOIN customer c ON o.customer_id = c.id
    JOIN address a ON o.address_id = a.id
    JOIN payment p ON p.order_id = o.id
"#;

const ORDER_ITEM_VIEW_SELECT: &str = r#"
    SELECT
        oi.rid, oi.order_id, oi.chrt_id, oi.track_number, oi.price, oi.sale,
        oi.quantity, oi.total_price, oi.status, oi.created,
        s.tech_size AS size,
        i.nm_id, i.name, i.brand, i.price AS item_price
    FROM order_item oi
    JOIN size s ON oi.chrt_id = s.id
    JOIN item i ON oi.nm_id = i.nm_id
    WHERE oi.order_id = ANY($1)
    ORDER BY oi.created, oi.rid
"#;

// ============================================================================
// Unit Tests
// ============================================================================
