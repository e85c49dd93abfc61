//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::domain::order::{Delivery, Item, Order, Payment};
use crate::storage::{OrderStore, StoreError};

pub(crate) fn sample_order(order_uid: &str) -> Order {
    let mut order = Order::new(order_uid, Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap());
    order.track_number = Some("WBILMTESTTRACK".to_string());
    order.entry = Some("WBIL".to_string());
    order.delivery = Some(Delivery {
        name: "Test Testov".to_string(),
        phone: "+9720000000".to_string(),
        zip: "2639809".to_string(),
        city: "Kiryat Mozkin".to_string(),
        address: "Ploshad Mira 15".to_string(),
        region: "Kraiot".to_string(),
        email: "test@gmail.com".to_string(),
    });
    order.payment = Some(Payment {
        transaction: Some(order_uid.to_string()),
        currency: Some("USD".to_string()),
        provider: Some("wbpay".to_string()),
        amount: Some(1817),
        payment_dt: Some(1637907727),
        bank: Some("alpha".to_string()),
        delivery_cost: Some(1500),
        goods_total: Some(317),
        custom_fee: Some(0),
        ..Default::default()
    });
    order.items = vec![Item {
        chrt_id: Some(9934930),
        track_number: Some("WBILMTESTTRACK".to_string()),
        price: Some(453),
        rid: Some("ab4219087a764ae0btest".to_string()),
        name: Some("Mascaras".to_string()),
        sale: Some(30),
        size: Some("0".to_string()),
        total_price: Some(317),
        nm_id: Some(2389212),
        brand: Some("Vivienne Sabo".to_string()),
        status: Some(202),
    }];
    order.locale = Some("en".to_string());
    order.customer_id = Some("test".to_string());
    order.delivery_service = Some("meest".to_string());
    order.shard_key = Some("9".to_string());
    order.sm_id = Some(99);
    order.oof_shard = Some("1".to_string());
    order
}

/// In-memory `OrderStore` with call counters and switchable failures.
#[derive(Default)]
pub(crate) struct FakeStore {
    orders: Mutex<HashMap<String, Order>>,
    save_calls: AtomicUsize,
    get_calls: AtomicUsize,
    fail_saves: AtomicBool,
    fail_reads: AtomicBool,
}

impl FakeStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Write directly, bypassing counters and the cache.
    pub(crate) async fn insert(&self, order: Order) {
        self.orders.lock().await.insert(order.order_uid.clone(), order);
    }

    pub(crate) async fn stored(&self, order_uid: &str) -> Option<Order> {
        self.orders.lock().await.get(order_uid).cloned()
    }

    pub(crate) async fn len(&self) -> usize {
        self.orders.lock().await.len()
    }

    pub(crate) fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn unavailable() -> StoreError {
        StoreError::Database(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl OrderStore for FakeStore {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.insert(order.clone()).await;
        Ok(())
    }

    async fn get(&self, order_uid: &str) -> Result<Option<Order>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self.stored(order_uid).await)
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self.orders.lock().await.values().cloned().collect())
    }

    async fn delete(&self, order_uid: &str) -> Result<bool, StoreError> {
        Ok(self.orders.lock().await.remove(order_uid).is_some())
    }
}
