use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;

use super::{OrderRepository, StoreError, StoreResult};
use crate::config::DatabaseConfig;
use crate::domain::order::{truncate_micros, Delivery, Item, Order, Payment};

// ============================================================================
// Postgres Order Repository
// ============================================================================
//
// Layout: orders (header), deliveries and payments (1:1, keyed by order_uid)
// and items (keyed by a surrogate id, ordered by position). All child tables
// cascade on delete from orders.
//
// Writes go through a single transaction; reads join the three 1:1 tables
// and load items in one extra query (one batched query for find_all).
//
// ============================================================================

/// Item rows per multi-row INSERT. Keeps the statement well below the
/// Postgres limit of 65535 bind parameters (13 per row).
const ITEMS_PER_INSERT: usize = 1000;

/// Header + delivery + payment select. Inner joins, so a header without its
/// delivery or payment row is never surfaced as an aggregate.
macro_rules! order_select {
    ($tail:literal) => {
        concat!(
            "SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature, ",
            "o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard, ",
            "d.name, d.phone, d.zip, d.city, d.address, d.region, d.email, ",
            "p.transaction, p.request_id, p.currency, p.provider, p.amount, p.payment_dt, ",
            "p.bank, p.delivery_cost, p.goods_total, p.custom_fee ",
            "FROM orders o ",
            "JOIN deliveries d ON d.order_uid = o.order_uid ",
            "JOIN payments p ON p.order_uid = o.order_uid",
            $tail
        )
    };
}

const SELECT_ITEMS: &str = "SELECT order_uid, chrt_id, track_number, price, rid, name, \
                            sale, size, total_price, nm_id, brand, status FROM items";

/// Open a connection pool from the service configuration.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.name);

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Migrations applied successfully");
    Ok(())
}

#[derive(Clone)]
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
    async fn save(&self, order: &Order) -> StoreResult<()> {
        let fail = |source: sqlx::Error| StoreError::Database {
            operation: "save order",
            source,
        };

        // Dropping the transaction without commit rolls everything back.
        let mut tx = self.pool.begin().await.map_err(fail)?;

        upsert_header(&mut tx, order).await.map_err(fail)?;
        upsert_delivery(&mut tx, order).await.map_err(fail)?;
        upsert_payment(&mut tx, order).await.map_err(fail)?;
        replace_items(&mut tx, order).await.map_err(fail)?;

        tx.commit().await.map_err(fail)?;

        tracing::debug!(
            order_uid = %order.order_uid,
            item_count = order.items.len(),
            "Order committed"
        );

        Ok(())
    }

    async fn find_by_id(&self, order_uid: &str) -> StoreResult<Order> {
        let fail = |source: sqlx::Error| StoreError::Database {
            operation: "find order by id",
            source,
        };

        let row: Option<OrderRow> = sqlx::query_as(order_select!(" WHERE o.order_uid = $1"))
            .bind(order_uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(fail)?;

        let row = row.ok_or_else(|| StoreError::NotFound(order_uid.to_string()))?;

        let items: Vec<ItemRow> =
            sqlx::query_as(&format!("{} WHERE order_uid = $1 ORDER BY position", SELECT_ITEMS))
                .bind(order_uid)
                .fetch_all(&self.pool)
                .await
                .map_err(fail)?;

        Ok(row.into_order(items.into_iter().map(Item::from).collect()))
    }

    async fn find_all(&self) -> StoreResult<Vec<Order>> {
        let fail = |source: sqlx::Error| StoreError::Database {
            operation: "find all orders",
            source,
        };

        let rows: Vec<OrderRow> = sqlx::query_as(order_select!(" ORDER BY o.date_created DESC"))
            .fetch_all(&self.pool)
            .await
            .map_err(fail)?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let order_uids: Vec<String> = rows.iter().map(|row| row.order_uid.clone()).collect();

        // One query for every item of every order.
        let item_rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "{} WHERE order_uid = ANY($1) ORDER BY order_uid, position",
            SELECT_ITEMS
        ))
        .bind(&order_uids)
        .fetch_all(&self.pool)
        .await
        .map_err(fail)?;

        let mut items_by_order = group_items(item_rows);

        tracing::debug!(
            orders = rows.len(),
            orders_with_items = items_by_order.len(),
            "Loaded all orders"
        );

        Ok(rows
            .into_iter()
            .map(|row| {
                let items = items_by_order.remove(&row.order_uid).unwrap_or_default();
                row.into_order(items)
            })
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Database {
                operation: "ping",
                source,
            })?;
        Ok(())
    }
}

// ============================================================================
// Write helpers (run inside the save transaction)
// ============================================================================

async fn upsert_header(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO orders (
               order_uid, track_number, entry, locale, internal_signature,
               customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
           ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
           ON CONFLICT (order_uid) DO UPDATE SET
               track_number = EXCLUDED.track_number,
               entry = EXCLUDED.entry,
               locale = EXCLUDED.locale,
               internal_signature = EXCLUDED.internal_signature,
               customer_id = EXCLUDED.customer_id,
               delivery_service = EXCLUDED.delivery_service,
               shardkey = EXCLUDED.shardkey,
               sm_id = EXCLUDED.sm_id,
               date_created = EXCLUDED.date_created,
               oof_shard = EXCLUDED.oof_shard"#,
    )
    .bind(&order.order_uid)
    .bind(&order.track_number)
    .bind(&order.entry)
    .bind(&order.locale)
    .bind(&order.internal_signature)
    .bind(&order.customer_id)
    .bind(&order.delivery_service)
    .bind(&order.shardkey)
    .bind(order.sm_id)
    .bind(truncate_micros(order.date_created))
    .bind(&order.oof_shard)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_delivery(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    let d = &order.delivery;
    sqlx::query(
        r#"INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
           ON CONFLICT (order_uid) DO UPDATE SET
               name = EXCLUDED.name,
               phone = EXCLUDED.phone,
               zip = EXCLUDED.zip,
               city = EXCLUDED.city,
               address = EXCLUDED.address,
               region = EXCLUDED.region,
               email = EXCLUDED.email"#,
    )
    .bind(&order.order_uid)
    .bind(&d.name)
    .bind(&d.phone)
    .bind(&d.zip)
    .bind(&d.city)
    .bind(&d.address)
    .bind(&d.region)
    .bind(&d.email)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_payment(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    let p = &order.payment;
    sqlx::query(
        r#"INSERT INTO payments (
               order_uid, transaction, request_id, currency, provider,
               amount, payment_dt, bank, delivery_cost, goods_total, custom_fee
           ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
           ON CONFLICT (order_uid) DO UPDATE SET
               transaction = EXCLUDED.transaction,
               request_id = EXCLUDED.request_id,
               currency = EXCLUDED.currency,
               provider = EXCLUDED.provider,
               amount = EXCLUDED.amount,
               payment_dt = EXCLUDED.payment_dt,
               bank = EXCLUDED.bank,
               delivery_cost = EXCLUDED.delivery_cost,
               goods_total = EXCLUDED.goods_total,
               custom_fee = EXCLUDED.custom_fee"#,
    )
    .bind(&order.order_uid)
    .bind(&p.transaction)
    .bind(&p.request_id)
    .bind(&p.currency)
    .bind(&p.provider)
    .bind(p.amount)
    .bind(p.payment_dt)
    .bind(&p.bank)
    .bind(p.delivery_cost)
    .bind(p.goods_total)
    .bind(p.custom_fee)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Items are never diffed: delete the old set, insert the new one in order.
async fn replace_items(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM items WHERE order_uid = $1")
        .bind(&order.order_uid)
        .execute(&mut *conn)
        .await?;

    let positioned: Vec<(usize, &Item)> = order.items.iter().enumerate().collect();

    for chunk in positioned.chunks(ITEMS_PER_INSERT) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO items (order_uid, position, chrt_id, track_number, price, rid, \
             name, sale, size, total_price, nm_id, brand, status) ",
        );

        builder.push_values(chunk.iter(), |mut row, &(position, item)| {
            row.push_bind(&order.order_uid)
                .push_bind(position as i32)
                .push_bind(item.chrt_id)
                .push_bind(&item.track_number)
                .push_bind(item.price)
                .push_bind(&item.rid)
                .push_bind(&item.name)
                .push_bind(item.sale)
                .push_bind(&item.size)
                .push_bind(item.total_price)
                .push_bind(item.nm_id)
                .push_bind(&item.brand)
                .push_bind(item.status);
        });

        builder.build().execute(&mut *conn).await?;
    }

    Ok(())
}

// ============================================================================
// Row shapes
// ============================================================================
//
// Kept apart from the domain types so column naming stays local to this file.
//

#[derive(Debug, FromRow)]
struct DeliveryRow {
    name: String,
    phone: String,
    zip: String,
    city: String,
    address: String,
    region: String,
    email: String,
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    transaction: String,
    request_id: String,
    currency: String,
    provider: String,
    amount: i64,
    payment_dt: i64,
    bank: String,
    delivery_cost: i64,
    goods_total: i64,
    custom_fee: i64,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i64,
    date_created: DateTime<Utc>,
    oof_shard: String,
    #[sqlx(flatten)]
    delivery: DeliveryRow,
    #[sqlx(flatten)]
    payment: PaymentRow,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    order_uid: String,
    chrt_id: i64,
    track_number: String,
    price: i64,
    rid: String,
    name: String,
    sale: i64,
    size: String,
    total_price: i64,
    nm_id: i64,
    brand: String,
    status: i64,
}

impl OrderRow {
    fn into_order(self, items: Vec<Item>) -> Order {
        Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: self.delivery.into(),
            payment: self.payment.into(),
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

impl From<DeliveryRow> for Delivery {
    fn from(row: DeliveryRow) -> Self {
        Self {
            name: row.name,
            phone: row.phone,
            zip: row.zip,
            city: row.city,
            address: row.address,
            region: row.region,
            email: row.email,
        }
    }
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            transaction: row.transaction,
            request_id: row.request_id,
            currency: row.currency,
            provider: row.provider,
            amount: row.amount,
            payment_dt: row.payment_dt,
            bank: row.bank,
            delivery_cost: row.delivery_cost,
            goods_total: row.goods_total,
            custom_fee: row.custom_fee,
        }
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            rid: row.rid,
            name: row.name,
            sale: row.sale,
            size: row.size,
            total_price: row.total_price,
            nm_id: row.nm_id,
            brand: row.brand,
            status: row.status,
        }
    }
}

/// Bucket item rows by their parent order, keeping row order within a bucket.
fn group_items(rows: Vec<ItemRow>) -> HashMap<String, Vec<Item>> {
    let mut grouped: HashMap<String, Vec<Item>> = HashMap::new();
    for row in rows {
        grouped.entry(row.order_uid.clone()).or_default().push(row.into());
    }
    grouped
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item_row(order_uid: &str, rid: &str) -> ItemRow {
        ItemRow {
            order_uid: order_uid.to_string(),
            chrt_id: 9934930,
            track_number: "WBILMTESTTRACK".to_string(),
            price: 453,
            rid: rid.to_string(),
            name: "Mascaras".to_string(),
            sale: 30,
            size: "0".to_string(),
            total_price: 317,
            nm_id: 2389212,
            brand: "Vivienne Sabo".to_string(),
            status: 202,
        }
    }

    #[test]
    fn test_group_items_by_order_keeps_position() {
        let rows = vec![
            item_row("a", "a-1"),
            item_row("a", "a-2"),
            item_row("b", "b-1"),
        ];

        let grouped = group_items(rows);

        assert_eq!(grouped.len(), 2);
        let rids: Vec<&str> = grouped["a"].iter().map(|i| i.rid.as_str()).collect();
        assert_eq!(rids, vec!["a-1", "a-2"]);
        assert_eq!(grouped["b"].len(), 1);
    }

    #[test]
    fn test_order_without_items_gets_empty_list() {
        let mut grouped = group_items(vec![item_row("a", "a-1")]);
        let items = grouped.remove("missing").unwrap_or_default();
        assert!(items.is_empty());
    }

    #[test]
    fn test_order_select_shape() {
        let sql = order_select!(" WHERE o.order_uid = $1");
        assert!(sql.contains("JOIN deliveries d"));
        assert!(sql.contains("JOIN payments p"));
        assert!(sql.ends_with("WHERE o.order_uid = $1"));
    }
}

// ============================================================================
// Postgres-backed Tests (cargo test --features pg-tests, needs DATABASE_URL)
// ============================================================================
