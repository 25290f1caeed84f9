//! End-to-end pipeline tests.
//!
//! Command → EventStore → EventBus → (projections, order/stock saga) → read models
//!
//! Verifies:
//! - Order lines move stock through the saga and the journal shows it
//! - Short stock backorders the line instead of going negative
//! - Cancelling returns deducted stock
//! - A rebuild from the log matches the live read side
//! - Resuming the saga over the log catches up on missed order lines

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use chrono::Utc;
    use serde_json::Value as JsonValue;

    use woodhop_core::{AggregateId, CustomerId, ExpectedVersion, Money};
    use woodhop_events::{EventEnvelope, InMemoryEventBus, Saga};
    use woodhop_inventory::{CreateItem, InventoryCommand, InventoryItem, InventoryItemId, StockAction};
    use woodhop_products::ProductId;
    use woodhop_sales::{
        AddLine, CancelOrder, DeliveryOption, Order, OrderCommand, OrderId, OrderStatus, PlaceOrder,
    };

    use crate::aggregate_types;
    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, UncommittedEvent};
    use crate::projections::{
        InventoryProjection, InventoryView, MovementKey, MovementView, OrderView, OrdersProjection, Projection,
        ReplayError, apply_or_catch_up, rebuild_from_scratch,
    };
    use crate::read_model::InMemoryReadStore;
    use crate::saga::{DispatchingExecutor, OrderStockSaga, SagaRunner, StockDirection, StockReference};
    use crate::workers::{ProjectionWorker, WorkerHandle};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type Store = Arc<InMemoryEventStore>;
    type Inventory = InventoryProjection<InMemoryReadStore<ProductId, InventoryView>, InMemoryReadStore<MovementKey, MovementView>>;
    type Orders = OrdersProjection<InMemoryReadStore<OrderId, OrderView>>;

    struct Pipeline {
        store: Store,
        dispatcher: Arc<CommandDispatcher<Store, Bus>>,
        inventory: Arc<Inventory>,
        orders: Arc<Orders>,
        workers: Vec<WorkerHandle>,
    }

    impl Pipeline {
        fn start() -> Self {
            Self::build(true)
        }

        /// Read side only; order lines are committed with no saga listening.
        fn without_saga() -> Self {
            Self::build(false)
        }

        fn build(with_saga: bool) -> Self {
            let store: Store = Arc::new(InMemoryEventStore::new());
            let bus: Bus = Arc::new(InMemoryEventBus::new());
            let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
            let inventory = Arc::new(InventoryProjection::new(InMemoryReadStore::new(), InMemoryReadStore::new()));
            let orders = Arc::new(OrdersProjection::new(InMemoryReadStore::new()));

            let projections: Vec<Arc<dyn Projection>> = vec![inventory.clone() as Arc<dyn Projection>, orders.clone()];
            let read_store = store.clone();
            let read_side = ProjectionWorker::spawn("read-models", &bus, move |env: &EventEnvelope<JsonValue>| {
                for p in &projections {
                    apply_or_catch_up(&*read_store, p.as_ref(), env)?;
                }
                Ok::<_, ReplayError>(())
            })
            .unwrap();

            let mut workers = vec![read_side];
            if with_saga {
                let runner: SagaRunner<OrderStockSaga, _, _> =
                    SagaRunner::new(store.clone(), DispatchingExecutor::new(dispatcher.clone()));
                let saga =
                    ProjectionWorker::spawn("order-stock", &bus, move |env: &EventEnvelope<JsonValue>| runner.handle(env))
                        .unwrap();
                workers.push(saga);
            }

            Self {
                store,
                dispatcher,
                inventory,
                orders,
                workers,
            }
        }

        fn stock_product(&self, quantity: u64) -> ProductId {
            let product_id = ProductId::new(AggregateId::new());
            self.dispatcher
                .dispatch(
                    InventoryItemId::for_product(product_id).0,
                    aggregate_types::INVENTORY_ITEM,
                    InventoryCommand::CreateItem(CreateItem {
                        product_id,
                        initial_quantity: quantity,
                        uom: None,
                        reorder_level: None,
                        reorder_quantity: None,
                        warehouse_location: None,
                        updated_by: None,
                        occurred_at: Utc::now(),
                    }),
                    |id| InventoryItem::empty(InventoryItemId::new(id)),
                )
                .unwrap();
            product_id
        }

        fn order(&self, command: OrderCommand, order_id: OrderId) {
            self.dispatcher
                .dispatch(order_id.0, aggregate_types::ORDER, command, |id| Order::empty(OrderId::new(id)))
                .unwrap();
        }

        fn place_order_with_line(&self, product_id: ProductId, quantity: u64) -> OrderId {
            let order_id = OrderId::new(AggregateId::new());
            self.order(
                OrderCommand::PlaceOrder(PlaceOrder {
                    order_id,
                    customer_id: CustomerId::new(),
                    delivery_option: DeliveryOption::Pickup,
                    description: String::new(),
                    occurred_at: Utc::now(),
                }),
                order_id,
            );
            self.order(
                OrderCommand::AddLine(AddLine {
                    order_id,
                    product_id,
                    vendor_id: None,
                    quantity,
                    unit_price: Money::from_cents(4_500),
                    occurred_at: Utc::now(),
                }),
                order_id,
            );
            order_id
        }

        /// Stock straight from the aggregate, independent of the read side.
        fn stock_on_hand(&self, product_id: ProductId) -> u64 {
            self.dispatcher
                .load(InventoryItemId::for_product(product_id).0, |id| InventoryItem::empty(InventoryItemId::new(id)))
                .unwrap()
                .quantity_available()
        }

        fn available(&self, product_id: &ProductId) -> Option<u64> {
            self.inventory.get(product_id).map(|v| v.quantity_available)
        }

        fn stop(self) {
            for w in self.workers {
                w.shutdown();
            }
        }
    }

    fn eventually(mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        check()
    }

    #[test]
    fn adding_a_line_deducts_stock_and_journals_the_movement() {
        let pipeline = Pipeline::start();
        let product_id = pipeline.stock_product(10);
        let order_id = pipeline.place_order_with_line(product_id, 3);

        assert!(eventually(|| pipeline.available(&product_id) == Some(7)));

        let expected = StockReference {
            order_id,
            line_no: 1,
            direction: StockDirection::Out,
        }
        .to_string();
        let journal = pipeline.inventory.journal(Some(product_id));
        let out = journal
            .iter()
            .find(|m| m.action == StockAction::Out)
            .unwrap_or_else(|| panic!("Expected an OUT movement"));
        assert_eq!(out.quantity, 3);
        assert_eq!(out.reference.as_deref(), Some(expected.as_str()));
        assert_eq!(out.available_after, 7);

        pipeline.stop();
    }

    #[test]
    fn short_stock_backorders_the_line() {
        let pipeline = Pipeline::start();
        let product_id = pipeline.stock_product(2);
        let order_id = pipeline.place_order_with_line(product_id, 5);

        assert!(eventually(|| {
            pipeline
                .orders
                .get(&order_id)
                .is_some_and(|o| o.lines.first().is_some_and(|l| l.backordered))
        }));
        assert_eq!(pipeline.available(&product_id), Some(2));

        let order = pipeline.orders.get(&order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.total, Money::from_cents(22_500));

        pipeline.stop();
    }

    #[test]
    fn cancelling_returns_deducted_stock() {
        let pipeline = Pipeline::start();
        let product_id = pipeline.stock_product(10);
        let order_id = pipeline.place_order_with_line(product_id, 4);
        assert!(eventually(|| pipeline.available(&product_id) == Some(6)));

        pipeline.order(
            OrderCommand::CancelOrder(CancelOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
            order_id,
        );

        assert!(eventually(|| pipeline.available(&product_id) == Some(10)));
        assert!(eventually(|| {
            pipeline.orders.get(&order_id).is_some_and(|o| o.status == OrderStatus::Cancelled)
        }));
        let restock = StockReference {
            order_id,
            line_no: 1,
            direction: StockDirection::In,
        }
        .to_string();
        assert!(
            pipeline
                .inventory
                .journal(Some(product_id))
                .iter()
                .any(|m| m.action == StockAction::In && m.reference.as_deref() == Some(restock.as_str()))
        );

        pipeline.stop();
    }

    #[test]
    fn rebuild_from_the_log_matches_the_live_read_side() {
        let pipeline = Pipeline::start();
        let product_id = pipeline.stock_product(8);
        let order_id = pipeline.place_order_with_line(product_id, 2);
        assert!(eventually(|| pipeline.available(&product_id) == Some(6)));
        assert!(eventually(|| pipeline.orders.get(&order_id).is_some()));

        let inventory: Inventory = InventoryProjection::new(InMemoryReadStore::new(), InMemoryReadStore::new());
        let orders: Orders = OrdersProjection::new(InMemoryReadStore::new());
        let fresh: [&dyn Projection; 2] = [&inventory, &orders];
        let report = rebuild_from_scratch(&*pipeline.store, &fresh).unwrap();

        assert!(report.events >= 5);
        assert_eq!(inventory.get(&product_id), pipeline.inventory.get(&product_id));
        assert_eq!(orders.get(&order_id), pipeline.orders.get(&order_id));

        pipeline.stop();
    }

    #[test]
    fn resuming_the_saga_moves_stock_for_lines_committed_while_it_was_down() {
        let pipeline = Pipeline::without_saga();
        let product_id = pipeline.stock_product(10);
        let order_id = pipeline.place_order_with_line(product_id, 4);
        assert_eq!(pipeline.stock_on_hand(product_id), 10);

        let runner: SagaRunner<OrderStockSaga, _, _> =
            SagaRunner::new(pipeline.store.clone(), DispatchingExecutor::new(pipeline.dispatcher.clone()));
        let report = runner.resume().unwrap();
        assert_eq!(report.failures, 0);
        assert_eq!(pipeline.stock_on_hand(product_id), 6);

        let state = runner
            .repository()
            .load_state(OrderStockSaga::saga_id(&order_id), &order_id)
            .unwrap();
        assert!(state.lines[&1].deducted);

        // A second resume over the same log changes nothing.
        runner.resume().unwrap();
        assert_eq!(pipeline.stock_on_hand(product_id), 6);
        assert!(eventually(|| pipeline.available(&product_id) == Some(6)));

        pipeline.stop();
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let store = InMemoryEventStore::new();
        let order_id = AggregateId::new();
        let event = |n: u32| UncommittedEvent {
            event_id: uuid::Uuid::now_v7(),
            aggregate_id: order_id,
            aggregate_type: aggregate_types::ORDER.to_string(),
            event_type: "sales.order.test".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({ "n": n }),
        };

        store.append(vec![event(1)], ExpectedVersion::Exact(0)).unwrap();
        match store.append(vec![event(2)], ExpectedVersion::Exact(0)) {
            Err(EventStoreError::Concurrency(_)) => {}
            other => panic!("Expected a concurrency conflict, got {other:?}"),
        }
        assert_eq!(store.load_stream(order_id).unwrap().len(), 1);
    }
}
