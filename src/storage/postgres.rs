use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::collections::HashMap;
use std::time::Duration;

use super::{OrderStore, StoreError};
use crate::domain::order::{Delivery, Item, Order, Payment};
use crate::error::ConnectionError;

// ============================================================================
// PostgreSQL Order Store
// ============================================================================
//
// Tables (see migrations/0001_orders.sql):
//   orders      one row per aggregate, keyed by order_uid
//   deliveries  0..1 per order
//   payments    0..1 per order
//   items       ordered by `position`
//
// `save` upserts the order row and replaces its children inside a single
// transaction, so a redelivered message never duplicates items and a failed
// write never leaves a partial aggregate behind.
//
// Reads take several statements, so they run in one REPEATABLE READ
// snapshot; a save committing in between is either fully seen or not at all.
//
// ============================================================================

const SCHEMA: &str = include_str!("../../migrations/0001_orders.sql");

const SELECT_ORDERS: &str = r#"
    SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
           o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created,
           o.oof_shard,
           d.name AS d_name, d.phone AS d_phone, d.zip AS d_zip, d.city AS d_city,
           d.address AS d_address, d.region AS d_region, d.email AS d_email,
           (p.order_uid IS NOT NULL) AS has_payment,
           p.transaction_id AS p_transaction, p.request_id AS p_request_id,
           p.currency AS p_currency, p.provider AS p_provider, p.amount AS p_amount,
           p.payment_dt AS p_payment_dt, p.bank AS p_bank,
           p.delivery_cost AS p_delivery_cost, p.goods_total AS p_goods_total,
           p.custom_fee AS p_custom_fee
    FROM orders o
    LEFT JOIN deliveries d ON d.order_uid = o.order_uid
    LEFT JOIN payments p ON p.order_uid = o.order_uid
"#;

const SELECT_ITEMS: &str = r#"
    SELECT order_uid, chrt_id, track_number, price, rid, name, sale, size,
           total_price, nm_id, brand, status
    FROM items
"#;

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool and prove the server answers.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, ConnectionError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(ConnectionError::Database)?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Create the order tables if they do not exist yet. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), ConnectionError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(ConnectionError::Migration)?;

        tracing::info!("Order schema is up to date");
        Ok(())
    }

    /// Read-only transaction over one consistent snapshot.
    async fn snapshot(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn write_order(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature, customer_id,
                delivery_service, shardkey, sm_id, date_created, oof_shard
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
        .bind(&order.shard_key)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn write_delivery(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), sqlx::Error> {
        let Some(delivery) = &order.delivery else {
            sqlx::query("DELETE FROM deliveries WHERE order_uid = $1")
                .bind(&order.order_uid)
                .execute(&mut **tx)
                .await?;
            return Ok(());
        };

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
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn write_payment(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), sqlx::Error> {
        let Some(payment) = &order.payment else {
            sqlx::query("DELETE FROM payments WHERE order_uid = $1")
                .bind(&order.order_uid)
                .execute(&mut **tx)
                .await?;
            return Ok(());
        };

        sqlx::query(
            r#"INSERT INTO payments (
                order_uid, transaction_id, request_id, currency, provider, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO UPDATE SET
                transaction_id = EXCLUDED.transaction_id,
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
        .bind(&payment.transaction)
        .bind(&payment.request_id)
        .bind(&payment.currency)
        .bind(&payment.provider)
        .bind(payment.amount)
        .bind(payment.payment_dt)
        .bind(&payment.bank)
        .bind(payment.delivery_cost)
        .bind(payment.goods_total)
        .bind(payment.custom_fee)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn write_items(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM items WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(&mut **tx)
            .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO items (
                    order_uid, position, chrt_id, track_number, price, rid, name, sale,
                    size, total_price, nm_id, brand, status
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#,
            )
            .bind(&order.order_uid)
            .bind(position as i32)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        // Dropping `tx` on an early return rolls the whole aggregate back.
        let mut tx = self.pool.begin().await?;

        Self::write_order(&mut tx, order).await?;
        Self::write_delivery(&mut tx, order).await?;
        Self::write_payment(&mut tx, order).await?;
        Self::write_items(&mut tx, order).await?;

        tx.commit().await?;

        tracing::debug!(
            order_uid = %order.order_uid,
            item_count = order.items.len(),
            "Order aggregate committed"
        );

        Ok(())
    }

    async fn get(&self, order_uid: &str) -> Result<Option<Order>, StoreError> {
        let mut tx = self.snapshot().await?;

        let query = format!("{SELECT_ORDERS} WHERE o.order_uid = $1");
        let Some(row) = sqlx::query(&query)
            .bind(order_uid)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let mut order = order_from_row(&row)?;

        let item_query = format!("{SELECT_ITEMS} WHERE order_uid = $1 ORDER BY position");
        let item_rows = sqlx::query(&item_query)
            .bind(order_uid)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        order.items = item_rows
            .iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(order))
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let mut tx = self.snapshot().await?;

        let order_rows = sqlx::query(SELECT_ORDERS).fetch_all(&mut *tx).await?;

        let item_query = format!("{SELECT_ITEMS} ORDER BY order_uid, position");
        let item_rows = sqlx::query(&item_query).fetch_all(&mut *tx).await?;
        tx.commit().await?;

        let mut items_by_order: HashMap<String, Vec<Item>> = HashMap::new();
        for row in &item_rows {
            let order_uid: String = row.try_get("order_uid")?;
            items_by_order
                .entry(order_uid)
                .or_default()
                .push(item_from_row(row)?);
        }

        let mut orders = Vec::with_capacity(order_rows.len());
        for row in &order_rows {
            let mut order = order_from_row(row)?;
            order.items = items_by_order.remove(&order.order_uid).unwrap_or_default();
            orders.push(order);
        }

        tracing::debug!(count = orders.len(), "Loaded all persisted orders");
        Ok(orders)
    }

    async fn delete(&self, order_uid: &str) -> Result<bool, StoreError> {
        // Child rows go with ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM orders WHERE order_uid = $1")
            .bind(order_uid)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let order_uid: String = row.try_get("order_uid")?;
    let date_created: DateTime<Utc> = row.try_get("date_created")?;

    let delivery = delivery_from_row(row, &order_uid)?;
    let has_payment: bool = row.try_get("has_payment")?;
    let payment = if has_payment {
        Some(Payment {
            transaction: row.try_get("p_transaction")?,
            request_id: row.try_get("p_request_id")?,
            currency: row.try_get("p_currency")?,
            provider: row.try_get("p_provider")?,
            amount: row.try_get("p_amount")?,
            payment_dt: row.try_get("p_payment_dt")?,
            bank: row.try_get("p_bank")?,
            delivery_cost: row.try_get("p_delivery_cost")?,
            goods_total: row.try_get("p_goods_total")?,
            custom_fee: row.try_get("p_custom_fee")?,
        })
    } else {
        None
    };

    Ok(Order {
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        delivery,
        payment,
        items: Vec::new(),
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shard_key: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created,
        oof_shard: row.try_get("oof_shard")?,
        order_uid,
    })
}

fn delivery_from_row(row: &PgRow, order_uid: &str) -> Result<Option<Delivery>, StoreError> {
    // Every delivery column is NOT NULL, so a null name means the join found no row.
    let Some(name) = row.try_get::<Option<String>, _>("d_name")? else {
        return Ok(None);
    };

    let field = |column: &str| -> Result<String, StoreError> {
        row.try_get::<Option<String>, _>(column)?
            .ok_or_else(|| StoreError::Corrupt {
                order_uid: order_uid.to_string(),
                reason: format!("delivery column {} is null", column),
            })
    };

    Ok(Some(Delivery {
        name,
        phone: field("d_phone")?,
        zip: field("d_zip")?,
        city: field("d_city")?,
        address: field("d_address")?,
        region: field("d_region")?,
        email: field("d_email")?,
    }))
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}

// ============================================================================
// Integration Tests (need a disposable PostgreSQL at DATABASE_URL)
// ============================================================================
