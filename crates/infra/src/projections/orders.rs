use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use woodhop_core::{CustomerId, Money};
use woodhop_events::EventEnvelope;
use woodhop_sales::{
    Delivery, DeliveryOption, OrderEvent, OrderId, OrderLine, OrderStatus, PaymentStatus,
};

use super::cursor::{ProjectionError, StreamCursors, decode};
use super::Projection;
use crate::aggregate_types;
use crate::read_model::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub order_date: DateTime<Utc>,
    pub delivery_option: DeliveryOption,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub description: String,
    /// Every line ever added, removed ones included (flagged).
    pub lines: Vec<OrderLine>,
    pub delivery: Option<Delivery>,
    pub total: Money,
}

impl OrderView {
    pub fn active_lines(&self) -> impl Iterator<Item = &OrderLine> {
        self.lines.iter().filter(|l| !l.removed)
    }

    fn recompute_total(&mut self) {
        self.total = self.active_lines().map(|l| l.subtotal).sum();
    }

    fn line_mut(&mut self, line_no: u32) -> Result<&mut OrderLine, ProjectionError> {
        let order_id = self.order_id;
        self.lines
            .iter_mut()
            .find(|l| l.line_no == line_no)
            .ok_or_else(|| ProjectionError::StreamMismatch(format!("order {order_id} has no line {line_no}")))
    }
}

#[derive(Debug)]
pub struct OrdersProjection<S>
where
    S: ReadStore<OrderId, OrderView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> OrdersProjection<S>
where
    S: ReadStore<OrderId, OrderView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, order_id: &OrderId) -> Option<OrderView> {
        self.store.get(order_id)
    }

    /// All orders, newest first.
    pub fn list(&self) -> Vec<OrderView> {
        let mut all = self.store.list();
        all.sort_by(|a, b| (b.order_date, b.order_id).cmp(&(a.order_date, a.order_id)));
        all
    }

    pub fn for_customer(&self, customer_id: CustomerId) -> Vec<OrderView> {
        self.list()
            .into_iter()
            .filter(|o| o.customer_id == customer_id)
            .collect()
    }

    /// Orders containing at least one active line sold by `vendor`.
    pub fn for_vendor(&self, vendor: CustomerId) -> Vec<OrderView> {
        self.list()
            .into_iter()
            .filter(|o| o.active_lines().any(|l| l.vendor_id == Some(vendor)))
            .collect()
    }

    /// Orders with an assigned delivery.
    pub fn deliveries(&self) -> Vec<(OrderId, Delivery)> {
        self.list()
            .into_iter()
            .filter_map(|o| o.delivery.map(|d| (o.order_id, d)))
            .collect()
    }

    fn apply_event(&self, event: OrderEvent) -> Result<(), ProjectionError> {
        if let OrderEvent::OrderPlaced(e) = event {
            self.store.upsert(
                e.order_id,
                OrderView {
                    order_id: e.order_id,
                    customer_id: e.customer_id,
                    order_date: e.occurred_at,
                    delivery_option: e.delivery_option,
                    payment_status: PaymentStatus::default(),
                    status: OrderStatus::default(),
                    description: e.description,
                    lines: vec![],
                    delivery: None,
                    total: Money::ZERO,
                },
            );
            return Ok(());
        }

        let order_id = event.order_id();
        let Some(mut view) = self.store.get(&order_id) else {
            return Err(ProjectionError::StreamMismatch(format!(
                "event for unknown order {order_id}"
            )));
        };

        match event {
            OrderEvent::OrderPlaced(_) => {}
            OrderEvent::LineAdded(e) => view.lines.push(e.line),
            OrderEvent::LineRemoved(e) => view.line_mut(e.line_no)?.removed = true,
            OrderEvent::LineBackordered(e) => view.line_mut(e.line_no)?.backordered = true,
            OrderEvent::PaymentStatusChanged(e) => view.payment_status = e.status,
            OrderEvent::OrderStatusChanged(e) => view.status = e.to,
            OrderEvent::OrderCancelled(_) => view.status = OrderStatus::Cancelled,
            OrderEvent::DeliveryAssigned(e) => view.delivery = Some(e.delivery),
            OrderEvent::DeliveryStatusChanged(e) => {
                if let Some(delivery) = view.delivery.as_mut() {
                    delivery.status = e.status;
                }
            }
        }

        view.recompute_total();
        self.store.upsert(order_id, view);
        Ok(())
    }
}

impl<S> Projection for OrdersProjection<S>
where
    S: ReadStore<OrderId, OrderView>,
{
    fn name(&self) -> &'static str {
        "orders"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::ORDER {
            return Ok(());
        }

        self.cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number(), || {
                let event: OrderEvent = decode(envelope)?;
                if event.order_id().0 != envelope.aggregate_id() {
                    return Err(ProjectionError::StreamMismatch(
                        "order_id does not match envelope aggregate_id".to_string(),
                    ));
                }
                self.apply_event(event)
            })
    }

    fn reset(&self) {
        self.cursors.clear();
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::test_support::envelope;
    use crate::read_model::InMemoryReadStore;
    use woodhop_core::AggregateId;
    use woodhop_products::ProductId;
    use woodhop_sales::{AddLine, CancelOrder, Order, OrderCommand, PlaceOrder, RemoveLine};

    fn run(p: &OrdersProjection<InMemoryReadStore<OrderId, OrderView>>, order: &mut Order, seq: &mut u64, cmd: OrderCommand) {
        for ev in woodhop_events::execute(order, &cmd).unwrap() {
            *seq += 1;
            p.apply_envelope(&envelope(aggregate_types::ORDER, ev.order_id().0, *seq, &ev)).unwrap();
        }
    }

    #[test]
    fn lines_totals_and_cancellation_are_tracked() {
        let p = OrdersProjection::new(InMemoryReadStore::new());
        let order_id = OrderId::new(AggregateId::new());
        let customer_id = CustomerId::new();
        let vendor = CustomerId::new();
        let mut order = Order::empty(order_id);
        let mut seq = 0;

        run(&p, &mut order, &mut seq, OrderCommand::PlaceOrder(PlaceOrder {
            order_id,
            customer_id,
            delivery_option: DeliveryOption::Pickup,
            description: String::new(),
            occurred_at: Utc::now(),
        }));
        for (qty, price, vendor_id) in [(2, 1_500, Some(vendor)), (1, 4_000, None)] {
            run(&p, &mut order, &mut seq, OrderCommand::AddLine(AddLine {
                order_id,
                product_id: ProductId::new(AggregateId::new()),
                vendor_id,
                quantity: qty,
                unit_price: Money::from_cents(price),
                occurred_at: Utc::now(),
            }));
        }
        assert_eq!(p.get(&order_id).unwrap().total, Money::from_cents(7_000));
        assert_eq!(p.for_vendor(vendor).len(), 1);

        run(&p, &mut order, &mut seq, OrderCommand::RemoveLine(RemoveLine { order_id, line_no: 1, occurred_at: Utc::now() }));
        let view = p.get(&order_id).unwrap();
        assert_eq!(view.total, Money::from_cents(4_000));
        assert_eq!(view.lines.len(), 2);
        assert!(p.for_vendor(vendor).is_empty());

        run(&p, &mut order, &mut seq, OrderCommand::CancelOrder(CancelOrder { order_id, occurred_at: Utc::now() }));
        assert_eq!(p.get(&order_id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(p.for_customer(customer_id).len(), 1);
        assert_eq!(view.total, order.total());
    }
}
