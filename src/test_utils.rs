//! Shared fixtures and in-process fakes for unit tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::order::{Delivery, Item, Order, Payment};
use crate::messaging::{OrderPublisher, PublishError};
use crate::store::{OrderRepository, StoreError, StoreResult};

/// A complete, valid order keyed by `order_uid`.
pub fn sample_order(order_uid: &str) -> Order {
    Order {
        order_uid: order_uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid.to_string(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1637907727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: 9934930,
            track_number: "WBILMTESTTRACK".to_string(),
            price: 453,
            rid: "ab4219087a764ae0btest".to_string(),
            name: "Mascaras".to_string(),
            sale: 30,
            size: "0".to_string(),
            total_price: 317,
            nm_id: 2389212,
            brand: "Vivienne Sabo".to_string(),
            status: 202,
        }],
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shardkey: "9".to_string(),
        sm_id: 99,
        date_created: Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap(),
        oof_shard: "1".to_string(),
    }
}

// ============================================================================
// In-memory repository
// ============================================================================

/// `OrderRepository` backed by a Vec, with switchable failure and latency.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<Vec<Order>>,
    failing: AtomicBool,
    delay: Option<Duration>,
    save_calls: AtomicUsize,
    find_by_id_calls: AtomicUsize,
    find_all_calls: AtomicUsize,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orders(orders: Vec<Order>) -> Self {
        Self {
            orders: Mutex::new(orders),
            ..Self::default()
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Store `order` as-is, bypassing the uid upsert.
    pub fn insert_raw(&self, order: Order) {
        self.orders.lock().push(order);
    }

    pub fn stored(&self, order_uid: &str) -> Option<Order> {
        self.orders
            .lock()
            .iter()
            .find(|o| o.order_uid == order_uid)
            .cloned()
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn find_by_id_calls(&self) -> usize {
        self.find_by_id_calls.load(Ordering::SeqCst)
    }

    pub fn find_all_calls(&self) -> usize {
        self.find_all_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, operation: &'static str) -> StoreResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database {
                operation,
                source: sqlx::Error::PoolTimedOut,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: &Order) -> StoreResult<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.enter("save order").await?;

        let mut orders = self.orders.lock();
        match orders.iter_mut().find(|o| o.order_uid == order.order_uid) {
            Some(existing) => *existing = order.clone(),
            None => orders.push(order.clone()),
        }
        Ok(())
    }

    async fn find_by_id(&self, order_uid: &str) -> StoreResult<Order> {
        self.find_by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.enter("find order by id").await?;

        self.stored(order_uid)
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))
    }

    async fn find_all(&self) -> StoreResult<Vec<Order>> {
        self.find_all_calls.fetch_add(1, Ordering::SeqCst);
        self.enter("find all orders").await?;

        Ok(self.orders.lock().clone())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.enter("ping").await
    }
}

// ============================================================================
// Recording publisher
// ============================================================================

/// `OrderPublisher` that keeps every message it was handed.
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    delay: Option<Duration>,
    failing: AtomicBool,
    available: AtomicBool,
    closed: AtomicBool,
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            delay: None,
            failing: AtomicBool::new(false),
            available: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderPublisher for RecordingPublisher {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Task("broker rejected message".to_string()));
        }
        self.published
            .lock()
            .push((key.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
