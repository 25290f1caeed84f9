//! Infrastructure wiring: event store, bus, dispatcher, read models, the
//! order/stock saga and the workers feeding them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use woodhop_auth::{Hs256JwtValidator, PasswordHasher, TokenIssuer};
use woodhop_core::{Aggregate, AggregateId, CustomerId, DomainError};
use woodhop_events::{Event, EventEnvelope, InMemoryEventBus};
use woodhop_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore, StoredEvent},
    projections::{
        CatalogProjection, CustomerDirectoryProjection, CustomerView, InventoryProjection, InventoryView, MovementKey,
        MovementView, OrderView, OrdersProjection, ProductView, Projection, ReplayError, SupplierDirectoryProjection,
        SupplierView, apply_or_catch_up, rebuild_from_scratch,
    },
    read_model::InMemoryReadStore,
    saga::{DispatchingExecutor, OrderStockSaga, SagaError, SagaRunner},
    workers::{ProjectionWorker, WorkerHandle},
};
use woodhop_parties::SupplierId;
use woodhop_products::ProductId;
use woodhop_sales::{Cart, OrderId};

use crate::config::ApiConfig;
use crate::middleware::RevokedTokens;

pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type SharedStore = Arc<dyn EventStore>;
pub type Dispatcher = CommandDispatcher<SharedStore, Bus>;

pub type Catalog = CatalogProjection<InMemoryReadStore<ProductId, ProductView>>;
pub type Inventory =
    InventoryProjection<InMemoryReadStore<ProductId, InventoryView>, InMemoryReadStore<MovementKey, MovementView>>;
pub type Customers = CustomerDirectoryProjection<InMemoryReadStore<CustomerId, CustomerView>>;
pub type Suppliers = SupplierDirectoryProjection<InMemoryReadStore<SupplierId, SupplierView>>;
pub type Orders = OrdersProjection<InMemoryReadStore<OrderId, OrderView>>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("read model rebuild failed: {0}")]
    Replay(#[from] ReplayError),

    #[error("order stock saga could not resume: {0}")]
    Saga(#[from] SagaError),

    #[error("failed to start worker: {0}")]
    Worker(#[from] std::io::Error),
}

/// Upper bound on live cart sessions; the least recently touched goes first.
const MAX_CART_SESSIONS: usize = 50_000;

#[derive(Debug)]
struct CartEntry {
    cart: Cart,
    touched: DateTime<Utc>,
}

/// Per-session carts, keyed by the `x-cart-session` header value.
///
/// A cart idle for longer than `idle_ttl` is gone, like a cart stored in an
/// expired web session.
#[derive(Debug)]
pub struct CartSessions {
    inner: Mutex<HashMap<String, CartEntry>>,
    idle_ttl: Duration,
    capacity: usize,
}

impl CartSessions {
    pub fn new(idle_ttl: Duration) -> Self {
        Self::with_capacity(idle_ttl, MAX_CART_SESSIONS)
    }

    fn with_capacity(idle_ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            idle_ttl,
            capacity,
        }
    }

    pub fn get(&self, session: &str) -> Cart {
        self.get_at(session, Utc::now())
    }

    /// Run `f` on the session's cart (created empty on first use).
    pub fn update<T>(&self, session: &str, f: impl FnOnce(&mut Cart) -> T) -> T {
        self.update_at(session, Utc::now(), f)
    }

    pub fn take(&self, session: &str) -> Cart {
        self.take_at(session, Utc::now())
    }

    pub fn len(&self) -> usize {
        self.with(|carts| carts.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expired(&self, entry: &CartEntry, now: DateTime<Utc>) -> bool {
        now - entry.touched > self.idle_ttl
    }

    fn get_at(&self, session: &str, now: DateTime<Utc>) -> Cart {
        self.with(|carts| match carts.get(session) {
            Some(entry) if !self.expired(entry, now) => entry.cart.clone(),
            _ => Cart::default(),
        })
    }

    fn update_at<T>(&self, session: &str, now: DateTime<Utc>, f: impl FnOnce(&mut Cart) -> T) -> T {
        self.with(|carts| {
            if !carts.contains_key(session) {
                carts.retain(|_, entry| !self.expired(entry, now));
                if carts.len() >= self.capacity {
                    let oldest = carts.iter().min_by_key(|(_, e)| e.touched).map(|(k, _)| k.clone());
                    if let Some(oldest) = oldest {
                        carts.remove(&oldest);
                    }
                }
            }
            let entry = carts.entry(session.to_string()).or_insert_with(|| CartEntry {
                cart: Cart::default(),
                touched: now,
            });
            if self.expired(entry, now) {
                entry.cart = Cart::default();
            }
            entry.touched = now;
            f(&mut entry.cart)
        })
    }

    fn take_at(&self, session: &str, now: DateTime<Utc>) -> Cart {
        self.with(|carts| match carts.remove(session) {
            Some(entry) if !self.expired(&entry, now) => entry.cart,
            _ => Cart::default(),
        })
    }

    fn with<T>(&self, f: impl FnOnce(&mut HashMap<String, CartEntry>) -> T) -> T {
        match self.inner.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

pub struct AppServices {
    pub config: ApiConfig,
    store: SharedStore,
    dispatcher: Arc<Dispatcher>,
    pub catalog: Arc<Catalog>,
    pub inventory: Arc<Inventory>,
    pub customers: Arc<Customers>,
    pub suppliers: Arc<Suppliers>,
    pub orders: Arc<Orders>,
    pub carts: CartSessions,
    pub tokens: TokenIssuer,
    pub jwt: Arc<Hs256JwtValidator>,
    pub revoked: Arc<RevokedTokens>,
    pub passwords: PasswordHasher,
    redeemed_links: Mutex<HashSet<Uuid>>,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl AppServices {
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        self.dispatcher.dispatch(aggregate_id, aggregate_type, command, make_aggregate)
    }

    pub fn load<A>(&self, aggregate_id: AggregateId, make_aggregate: impl FnOnce(AggregateId) -> A) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        self.dispatcher.load(aggregate_id, make_aggregate)
    }

    pub fn event_store(&self) -> &SharedStore {
        &self.store
    }

    /// Mark a login link as used. Returns `false` when it was already redeemed.
    pub fn redeem_login_link(&self, jti: Uuid) -> bool {
        match self.redeemed_links.lock() {
            Ok(mut used) => used.insert(jti),
            Err(poisoned) => poisoned.into_inner().insert(jti),
        }
    }

    fn projections(&self) -> Vec<Arc<dyn Projection>> {
        vec![
            self.catalog.clone() as Arc<dyn Projection>,
            self.inventory.clone(),
            self.customers.clone(),
            self.suppliers.clone(),
            self.orders.clone(),
        ]
    }

    /// Stop the background workers (tests and graceful shutdown).
    pub fn shutdown(&self) {
        let handles = match self.workers.lock() {
            Ok(mut w) => std::mem::take(&mut *w),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            tracing::debug!(worker = handle.name(), "stopping worker");
            handle.shutdown();
        }
    }
}

async fn open_store(config: &ApiConfig) -> Result<SharedStore, StartupError> {
    match (&config.database_url, config.use_persistent_stores) {
        (Some(url), true) => {
            let pool = sqlx::PgPool::connect(url).await?;
            let store = PostgresEventStore::new(pool);
            store.migrate().await?;
            tracing::info!("using Postgres event store");
            Ok(Arc::new(store))
        }
        _ => {
            tracing::info!("using in-memory event store");
            Ok(Arc::new(InMemoryEventStore::new()))
        }
    }
}

/// Build the services, rebuild read models from the log, resume the order
/// stock saga over the log, then start the read-side and saga workers.
pub async fn build_services(config: ApiConfig) -> Result<AppServices, StartupError> {
    let store = open_store(&config).await?;
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));

    let services = AppServices {
        tokens: TokenIssuer::new(&config.jwt_secret, config.session_ttl, config.login_link_ttl),
        jwt: Arc::new(Hs256JwtValidator::new(&config.jwt_secret)),
        passwords: PasswordHasher::new(config.password_hash_cost),
        carts: CartSessions::new(config.cart_idle_ttl),
        config,
        store: store.clone(),
        dispatcher: dispatcher.clone(),
        catalog: Arc::new(CatalogProjection::new(InMemoryReadStore::new())),
        inventory: Arc::new(InventoryProjection::new(InMemoryReadStore::new(), InMemoryReadStore::new())),
        customers: Arc::new(CustomerDirectoryProjection::new(InMemoryReadStore::new())),
        suppliers: Arc::new(SupplierDirectoryProjection::new(InMemoryReadStore::new())),
        orders: Arc::new(OrdersProjection::new(InMemoryReadStore::new())),
        revoked: Arc::new(RevokedTokens::default()),
        redeemed_links: Mutex::new(HashSet::new()),
        workers: Mutex::new(Vec::new()),
    };

    let projections = services.projections();
    let refs: Vec<&dyn Projection> = projections.iter().map(|p| p.as_ref()).collect();
    let report = rebuild_from_scratch(&*store, &refs)?;
    tracing::info!(events = report.events, "startup replay finished");

    let read_store = store.clone();
    let read_side = ProjectionWorker::spawn("read-models", &bus, move |env: &EventEnvelope<JsonValue>| {
        for p in &projections {
            apply_or_catch_up(&*read_store, p.as_ref(), env)?;
        }
        Ok::<_, ReplayError>(())
    })?;

    // Order lines committed while no saga was listening still move stock.
    let runner: SagaRunner<OrderStockSaga, SharedStore, _> =
        SagaRunner::new(store, DispatchingExecutor::new(dispatcher));
    let resumed = runner.resume()?;
    if resumed.failures > 0 {
        tracing::warn!(failures = resumed.failures, "some order stock steps are still pending");
    }
    let saga = ProjectionWorker::spawn("order-stock-saga", &bus, move |env: &EventEnvelope<JsonValue>| {
        runner.handle(env)
    })?;

    if let Ok(mut workers) = services.workers.lock() {
        workers.extend([read_side, saga]);
    }
    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;
    use woodhop_sales::CartLine;
    use woodhop_core::Money;

    fn cedar_posts(quantity: u64) -> CartLine {
        CartLine {
            product_id: ProductId::new(AggregateId::new()),
            name: "Cedar post".to_string(),
            unit_price: Money::from_cents(2_000),
            quantity,
            product_type: "Posts".to_string(),
        }
    }

    #[test]
    fn carts_are_isolated_per_session() {
        let carts = CartSessions::new(Duration::days(14));
        carts.update("a", |cart| cart.add(cedar_posts(2))).unwrap();

        assert_eq!(carts.get("a").count(), 2);
        assert!(carts.get("b").is_empty());
        assert_eq!(carts.take("a").count(), 2);
        assert!(carts.get("a").is_empty());
    }

    #[test]
    fn idle_carts_expire_and_are_evicted() {
        let carts = CartSessions::new(Duration::minutes(30));
        let start = Utc::now();
        carts.update_at("stale", start, |cart| cart.add(cedar_posts(1))).unwrap();
        carts.update_at("busy", start, |cart| cart.add(cedar_posts(3))).unwrap();

        let later = start + Duration::minutes(20);
        let resized = carts.update_at("busy", later, |cart| {
            let product_id = cart.lines()[0].product_id;
            cart.set_quantity(product_id, 4)
        });
        assert!(resized);

        let after_ttl = start + Duration::minutes(45);
        assert!(carts.get_at("stale", after_ttl).is_empty());
        assert_eq!(carts.get_at("busy", after_ttl).count(), 4);

        // Opening a new session sweeps the idle ones.
        carts.update_at("fresh", after_ttl, |_| ());
        assert_eq!(carts.len(), 2);
        assert!(carts.take_at("stale", after_ttl).is_empty());
    }

    #[test]
    fn session_count_is_capped() {
        let carts = CartSessions::with_capacity(Duration::days(14), 3);
        let start = Utc::now();
        for (i, session) in ["s1", "s2", "s3", "s4"].into_iter().enumerate() {
            carts.update_at(session, start + Duration::seconds(i as i64), |cart| cart.add(cedar_posts(1))).unwrap();
        }

        assert_eq!(carts.len(), 3);
        assert!(carts.get("s1").is_empty());
        assert_eq!(carts.get("s4").count(), 1);
    }

    #[tokio::test]
    async fn startup_replays_and_login_links_are_single_use() {
        let services = build_services(ApiConfig::default()).await.unwrap();
        let jti = Uuid::now_v7();
        assert!(services.redeem_login_link(jti));
        assert!(!services.redeem_login_link(jti));
        services.shutdown();
    }
}
