//! Order → inventory saga.
//!
//! Keeps stock in step with order lines:
//! 1. `LineAdded` → record an OUT movement for the line
//! 2. the matching `StockMoved` (by reference) → line is deducted
//! 3. `LineRemoved` / `OrderCancelled` → record an IN movement for every
//!    deducted line that was not restored yet
//!
//! An OUT that the inventory rejects (not enough stock) is compensated by
//! backordering the line on the order. Any other failure leaves the step
//! pending: a redelivered order event sends the outstanding movement again.
//!
//! Every movement carries a reference `order:<order id>:line:<n>:<out|in>`. The
//! inventory item ignores a reference it has already applied and the saga
//! state ignores steps it has already taken, so redelivered events are no-ops.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use woodhop_core::AggregateId;
use woodhop_events::{EventEnvelope, Saga, SagaAction};
use woodhop_inventory::{InventoryEvent, RecordMovement, StockAction};
use woodhop_products::ProductId;
use woodhop_sales::{BackorderLine, OrderEvent, OrderId};

use crate::aggregate_types;

const SAGA_NAMESPACE: Uuid = Uuid::from_u128(0x0c4e_8a51_27b9_4f3e_9d62_e1a0_54c8_b7f3);

pub const RECORD_MOVEMENT: &str = "RecordMovement";
pub const BACKORDER_LINE: &str = "BackorderLine";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockDirection {
    Out,
    In,
}

impl StockDirection {
    fn as_str(self) -> &'static str {
        match self {
            StockDirection::Out => "out",
            StockDirection::In => "in",
        }
    }
}

/// Movement reference tying an inventory movement to an order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockReference {
    pub order_id: OrderId,
    pub line_no: u32,
    pub direction: StockDirection,
}

impl fmt::Display for StockReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order:{}:line:{}:{}", self.order_id, self.line_no, self.direction.as_str())
    }
}

impl FromStr for StockReference {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let ["order", order_id, "line", line_no, direction] = parts.as_slice() else {
            return Err(());
        };
        let order_id = Uuid::parse_str(order_id).map_err(|_| ())?;
        let line_no = line_no.parse::<u32>().map_err(|_| ())?;
        let direction = match *direction {
            "out" => StockDirection::Out,
            "in" => StockDirection::In,
            _ => return Err(()),
        };
        Ok(Self {
            order_id: OrderId::new(AggregateId::from_uuid(order_id)),
            line_no,
            direction,
        })
    }
}

/// Stock bookkeeping for one order line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineStock {
    pub product_id: Option<ProductId>,
    pub quantity: u64,
    pub deducted: bool,
    /// Line removed or order cancelled: stock should go back once deducted.
    pub released: bool,
    pub restock_requested: bool,
    pub restored: bool,
    pub backordered: bool,
}

impl LineStock {
    fn needs_restock(&self) -> bool {
        self.deducted && self.released && !self.restock_requested
    }

    fn settled(&self) -> bool {
        self.backordered || !self.deducted || self.restored
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStockState {
    pub lines: BTreeMap<u32, LineStock>,
    pub cancelled: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderStockEvent {
    DeductionRequested { line_no: u32, product_id: ProductId, quantity: u64 },
    StockDeducted { line_no: u32 },
    LineReleased { line_no: u32 },
    OrderClosed,
    RestockRequested { line_no: u32 },
    StockRestored { line_no: u32 },
    LineBackordered { line_no: u32, reason: String },
    SagaCompleted,
}

impl OrderStockEvent {
    fn type_name(&self) -> &'static str {
        match self {
            OrderStockEvent::DeductionRequested { .. } => "deduction_requested",
            OrderStockEvent::StockDeducted { .. } => "stock_deducted",
            OrderStockEvent::LineReleased { .. } => "line_released",
            OrderStockEvent::OrderClosed => "order_closed",
            OrderStockEvent::RestockRequested { .. } => "restock_requested",
            OrderStockEvent::StockRestored { .. } => "stock_restored",
            OrderStockEvent::LineBackordered { .. } => "line_backordered",
            OrderStockEvent::SagaCompleted => "saga_completed",
        }
    }
}

fn emit(event: OrderStockEvent) -> Vec<SagaAction> {
    match serde_json::to_value(&event) {
        Ok(payload) => vec![SagaAction::Emit {
            event_type: event.type_name().to_string(),
            payload,
        }],
        Err(e) => {
            tracing::error!(error = %e, "failed to encode order stock saga event");
            vec![]
        }
    }
}

fn movement_command(
    order_id: OrderId,
    line_no: u32,
    line: &LineStock,
    product_id: ProductId,
    direction: StockDirection,
    incoming: &EventEnvelope<JsonValue>,
) -> Vec<SagaAction> {
    let (action, note) = match direction {
        StockDirection::Out => (StockAction::Out, format!("Order {order_id} line {line_no}")),
        StockDirection::In => (StockAction::In, format!("Order {order_id} line {line_no} returned")),
    };
    let cmd = RecordMovement {
        product_id,
        action,
        quantity: line.quantity,
        note,
        updated_by: None,
        reference: Some(StockReference { order_id, line_no, direction }.to_string()),
        occurred_at: incoming.occurred_at(),
    };
    match serde_json::to_value(&cmd) {
        Ok(payload) => vec![SagaAction::Command {
            aggregate_type: aggregate_types::INVENTORY_ITEM.to_string(),
            command_type: RECORD_MOVEMENT.to_string(),
            payload,
        }],
        Err(e) => {
            tracing::error!(error = %e, "failed to encode stock movement command");
            vec![]
        }
    }
}

fn restock(
    state: &OrderStockState,
    order_id: OrderId,
    line_no: u32,
    incoming: &EventEnvelope<JsonValue>,
) -> Vec<SagaAction> {
    let Some(line) = state.lines.get(&line_no) else {
        return vec![];
    };
    let Some(product_id) = line.product_id else {
        return vec![];
    };
    let mut actions = emit(OrderStockEvent::RestockRequested { line_no });
    actions.extend(movement_command(order_id, line_no, line, product_id, StockDirection::In, incoming));
    actions
}

/// Movement that was requested earlier but never confirmed by a `StockMoved`.
fn outstanding(
    state: &OrderStockState,
    order_id: OrderId,
    line_no: u32,
    incoming: &EventEnvelope<JsonValue>,
) -> Vec<SagaAction> {
    let Some(line) = state.lines.get(&line_no) else {
        return vec![];
    };
    let Some(product_id) = line.product_id else {
        return vec![];
    };
    if !line.deducted && !line.backordered {
        return movement_command(order_id, line_no, line, product_id, StockDirection::Out, incoming);
    }
    if line.restock_requested && !line.restored {
        return movement_command(order_id, line_no, line, product_id, StockDirection::In, incoming);
    }
    vec![]
}

/// What an incoming envelope means to this saga.
enum Signal {
    LineAdded { line_no: u32, product_id: ProductId, quantity: u64 },
    LineRemoved { line_no: u32 },
    OrderCancelled,
    Moved(StockReference),
}

fn read_signal(envelope: &EventEnvelope<JsonValue>) -> Option<(OrderId, Signal)> {
    match envelope.aggregate_type() {
        aggregate_types::ORDER => {
            let event: OrderEvent = serde_json::from_value(envelope.payload().clone()).ok()?;
            match event {
                OrderEvent::LineAdded(e) => Some((
                    e.order_id,
                    Signal::LineAdded {
                        line_no: e.line.line_no,
                        product_id: e.line.product_id,
                        quantity: e.line.quantity,
                    },
                )),
                OrderEvent::LineRemoved(e) => Some((e.order_id, Signal::LineRemoved { line_no: e.line_no })),
                OrderEvent::OrderCancelled(e) => Some((e.order_id, Signal::OrderCancelled)),
                _ => None,
            }
        }
        aggregate_types::INVENTORY_ITEM => {
            let event: InventoryEvent = serde_json::from_value(envelope.payload().clone()).ok()?;
            let InventoryEvent::StockMoved(moved) = event else {
                return None;
            };
            let reference: StockReference = moved.reference.as_deref()?.parse().ok()?;
            Some((reference.order_id, Signal::Moved(reference)))
        }
        _ => None,
    }
}

pub struct OrderStockSaga;

impl Saga for OrderStockSaga {
    type State = OrderStockState;
    type SagaEvent = OrderStockEvent;
    type CorrelationId = OrderId;

    fn saga_type() -> &'static str {
        aggregate_types::ORDER_STOCK_SAGA
    }

    fn correlate(envelope: &EventEnvelope<JsonValue>) -> Option<Self::CorrelationId> {
        read_signal(envelope).map(|(order_id, _)| order_id)
    }

    fn saga_id(correlation: &Self::CorrelationId) -> AggregateId {
        AggregateId::from_uuid(Uuid::new_v5(&SAGA_NAMESPACE, correlation.0.as_uuid().as_bytes()))
    }

    fn apply(state: &mut Self::State, event: &Self::SagaEvent) {
        match event {
            OrderStockEvent::DeductionRequested { line_no, product_id, quantity } => {
                let line = state.lines.entry(*line_no).or_default();
                line.product_id = Some(*product_id);
                line.quantity = *quantity;
                if state.cancelled {
                    line.released = true;
                }
            }
            OrderStockEvent::StockDeducted { line_no } => {
                state.lines.entry(*line_no).or_default().deducted = true;
            }
            OrderStockEvent::LineReleased { line_no } => {
                state.lines.entry(*line_no).or_default().released = true;
            }
            OrderStockEvent::OrderClosed => {
                state.cancelled = true;
                for line in state.lines.values_mut() {
                    line.released = true;
                }
            }
            OrderStockEvent::RestockRequested { line_no } => {
                state.lines.entry(*line_no).or_default().restock_requested = true;
            }
            OrderStockEvent::StockRestored { line_no } => {
                state.lines.entry(*line_no).or_default().restored = true;
            }
            OrderStockEvent::LineBackordered { line_no, .. } => {
                state.lines.entry(*line_no).or_default().backordered = true;
            }
            OrderStockEvent::SagaCompleted => state.completed = true,
        }
    }

    fn react(
        state: &Self::State,
        correlation: &Self::CorrelationId,
        incoming: &EventEnvelope<JsonValue>,
    ) -> Vec<SagaAction> {
        let Some((_, signal)) = read_signal(incoming) else {
            return vec![];
        };
        let order_id = *correlation;

        match signal {
            Signal::LineAdded { line_no, product_id, quantity } => {
                if state.lines.contains_key(&line_no) {
                    return outstanding(state, order_id, line_no, incoming);
                }
                let line = LineStock {
                    product_id: Some(product_id),
                    quantity,
                    ..LineStock::default()
                };
                let mut actions = emit(OrderStockEvent::DeductionRequested { line_no, product_id, quantity });
                actions.extend(movement_command(order_id, line_no, &line, product_id, StockDirection::Out, incoming));
                actions
            }
            Signal::LineRemoved { line_no } => {
                let Some(line) = state.lines.get(&line_no) else {
                    return vec![];
                };
                if line.released {
                    return outstanding(state, order_id, line_no, incoming);
                }
                let mut actions = emit(OrderStockEvent::LineReleased { line_no });
                if line.deducted && !line.restock_requested {
                    actions.extend(restock(state, order_id, line_no, incoming));
                }
                actions
            }
            Signal::OrderCancelled => {
                if state.cancelled {
                    return state
                        .lines
                        .keys()
                        .flat_map(|line_no| outstanding(state, order_id, *line_no, incoming))
                        .collect();
                }
                let mut actions = emit(OrderStockEvent::OrderClosed);
                for (line_no, line) in &state.lines {
                    if line.deducted && !line.restock_requested {
                        actions.extend(restock(state, order_id, *line_no, incoming));
                    }
                }
                actions
            }
            Signal::Moved(reference) => {
                let line_no = reference.line_no;
                let Some(line) = state.lines.get(&line_no) else {
                    return vec![];
                };
                match reference.direction {
                    StockDirection::Out => {
                        if line.deducted {
                            return vec![];
                        }
                        let mut actions = emit(OrderStockEvent::StockDeducted { line_no });
                        let deducted = LineStock { deducted: true, ..line.clone() };
                        if deducted.needs_restock() {
                            actions.extend(restock(state, order_id, line_no, incoming));
                        }
                        actions
                    }
                    StockDirection::In => {
                        if line.restored {
                            return vec![];
                        }
                        let mut actions = emit(OrderStockEvent::StockRestored { line_no });
                        let all_settled = state.cancelled
                            && state
                                .lines
                                .iter()
                                .all(|(n, l)| *n == line_no || l.settled());
                        if all_settled && !state.completed {
                            actions.extend(emit(OrderStockEvent::SagaCompleted));
                            actions.push(SagaAction::Complete);
                        }
                        actions
                    }
                }
            }
        }
    }

    fn on_command_failed(
        _state: &Self::State,
        _correlation: &Self::CorrelationId,
        failed: &SagaAction,
        reason: &str,
    ) -> Vec<SagaAction> {
        let SagaAction::Command { command_type, payload, .. } = failed else {
            return vec![];
        };
        if command_type != RECORD_MOVEMENT {
            return vec![];
        }
        let Ok(cmd) = serde_json::from_value::<RecordMovement>(payload.clone()) else {
            return vec![];
        };
        let Some(reference) = cmd.reference.as_deref().and_then(|r| r.parse::<StockReference>().ok()) else {
            return vec![];
        };
        if reference.direction != StockDirection::Out {
            tracing::warn!(order_id = %reference.order_id, line_no = reference.line_no, %reason, "stock return failed");
            return vec![];
        }

        let mut actions = emit(OrderStockEvent::LineBackordered {
            line_no: reference.line_no,
            reason: reason.to_string(),
        });
        let compensation = BackorderLine {
            order_id: reference.order_id,
            line_no: reference.line_no,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        };
        match serde_json::to_value(&compensation) {
            Ok(payload) => actions.push(SagaAction::Compensate {
                aggregate_type: aggregate_types::ORDER.to_string(),
                command_type: BACKORDER_LINE.to_string(),
                payload,
            }),
            Err(e) => tracing::error!(error = %e, "failed to encode backorder compensation"),
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use woodhop_core::{CustomerId, Money};
    use woodhop_inventory::{StockLevels, StockMoved};
    use woodhop_sales::{LineAdded, LineRemoved, OrderCancelled, OrderLine};

    fn env<E: Serialize>(aggregate_type: &str, aggregate_id: AggregateId, seq: u64, event: &E) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            aggregate_id,
            aggregate_type,
            seq,
            Utc::now(),
            serde_json::to_value(event).unwrap(),
        )
    }

    fn line_added(order_id: OrderId, line_no: u32, product_id: ProductId, quantity: u64) -> EventEnvelope<JsonValue> {
        let ev = OrderEvent::LineAdded(LineAdded {
            order_id,
            line: OrderLine {
                line_no,
                product_id,
                vendor_id: None::<CustomerId>,
                quantity,
                unit_price: Money::from_cents(100),
                subtotal: Money::from_cents(100 * quantity),
                backordered: false,
                removed: false,
            },
            occurred_at: Utc::now(),
        });
        env(aggregate_types::ORDER, order_id.0, u64::from(line_no) + 1, &ev)
    }

    fn stock_moved(reference: StockReference, product_id: ProductId) -> EventEnvelope<JsonValue> {
        let action = match reference.direction {
            StockDirection::Out => StockAction::Out,
            StockDirection::In => StockAction::In,
        };
        let ev = InventoryEvent::StockMoved(StockMoved {
            product_id,
            movement_no: 2,
            action,
            quantity: 1,
            note: String::new(),
            updated_by: None,
            reference: Some(reference.to_string()),
            levels_after: StockLevels::default(),
            occurred_at: Utc::now(),
        });
        env(aggregate_types::INVENTORY_ITEM, AggregateId::new(), 2, &ev)
    }

    /// Fold the emitted saga events of `actions` into `state`.
    fn fold(state: &mut OrderStockState, actions: &[SagaAction]) {
        for action in actions {
            if let SagaAction::Emit { payload, .. } = action {
                let ev: OrderStockEvent = serde_json::from_value(payload.clone()).unwrap();
                OrderStockSaga::apply(state, &ev);
            }
        }
    }

    fn commands(actions: &[SagaAction]) -> Vec<RecordMovement> {
        actions
            .iter()
            .filter_map(|a| match a {
                SagaAction::Command { payload, .. } => serde_json::from_value(payload.clone()).ok(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn reference_round_trips_through_display() {
        let reference = StockReference {
            order_id: OrderId::new(AggregateId::new()),
            line_no: 3,
            direction: StockDirection::In,
        };
        assert_eq!(reference.to_string().parse::<StockReference>(), Ok(reference));
        assert!("order:nope:line:1:out".parse::<StockReference>().is_err());
        assert!("manual restock".parse::<StockReference>().is_err());
    }

    #[test]
    fn line_added_requests_stock_out_once() {
        let order_id = OrderId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());
        let incoming = line_added(order_id, 1, product_id, 4);
        let mut state = OrderStockState::default();

        assert_eq!(OrderStockSaga::correlate(&incoming), Some(order_id));
        let actions = OrderStockSaga::react(&state, &order_id, &incoming);
        let cmds = commands(&actions);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].action, StockAction::Out);
        assert_eq!(cmds[0].quantity, 4);
        assert_eq!(cmds[0].reference.as_deref(), Some(format!("order:{order_id}:line:1:out").as_str()));

        fold(&mut state, &actions);

        // Until the movement is confirmed a redelivery sends the same OUT again,
        // without a second saga event.
        let again = OrderStockSaga::react(&state, &order_id, &incoming);
        assert!(again.iter().all(|a| matches!(a, SagaAction::Command { .. })));
        assert_eq!(commands(&again)[0].reference, cmds[0].reference);

        let out = StockReference { order_id, line_no: 1, direction: StockDirection::Out };
        let a = OrderStockSaga::react(&state, &order_id, &stock_moved(out, product_id));
        fold(&mut state, &a);
        assert!(OrderStockSaga::react(&state, &order_id, &incoming).is_empty());
    }

    #[test]
    fn removal_after_deduction_returns_stock() {
        let order_id = OrderId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());
        let mut state = OrderStockState::default();

        let a = OrderStockSaga::react(&state, &order_id, &line_added(order_id, 1, product_id, 2));
        fold(&mut state, &a);
        let out = StockReference { order_id, line_no: 1, direction: StockDirection::Out };
        let a = OrderStockSaga::react(&state, &order_id, &stock_moved(out, product_id));
        fold(&mut state, &a);
        assert!(state.lines[&1].deducted);

        let removed = OrderEvent::LineRemoved(LineRemoved {
            order_id,
            line_no: 1,
            product_id,
            quantity: 2,
            occurred_at: Utc::now(),
        });
        let a = OrderStockSaga::react(&state, &order_id, &env(aggregate_types::ORDER, order_id.0, 3, &removed));
        let cmds = commands(&a);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].action, StockAction::In);
        assert_eq!(cmds[0].quantity, 2);
        fold(&mut state, &a);

        // A redelivered removal only repeats the unconfirmed IN.
        let again = OrderStockSaga::react(&state, &order_id, &env(aggregate_types::ORDER, order_id.0, 3, &removed));
        assert_eq!(commands(&again).len(), 1);
        assert_eq!(commands(&again)[0].reference, cmds[0].reference);

        let back = StockReference { order_id, line_no: 1, direction: StockDirection::In };
        let a = OrderStockSaga::react(&state, &order_id, &stock_moved(back, product_id));
        fold(&mut state, &a);
        let again = OrderStockSaga::react(&state, &order_id, &env(aggregate_types::ORDER, order_id.0, 3, &removed));
        assert!(again.is_empty());
    }

    #[test]
    fn removal_before_deduction_waits_for_the_out_movement() {
        let order_id = OrderId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());
        let mut state = OrderStockState::default();

        let a = OrderStockSaga::react(&state, &order_id, &line_added(order_id, 1, product_id, 2));
        fold(&mut state, &a);

        let cancelled = OrderEvent::OrderCancelled(OrderCancelled { order_id, occurred_at: Utc::now() });
        let a = OrderStockSaga::react(&state, &order_id, &env(aggregate_types::ORDER, order_id.0, 3, &cancelled));
        assert!(commands(&a).is_empty());
        fold(&mut state, &a);

        let out = StockReference { order_id, line_no: 1, direction: StockDirection::Out };
        let a = OrderStockSaga::react(&state, &order_id, &stock_moved(out, product_id));
        let cmds = commands(&a);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].action, StockAction::In);
        fold(&mut state, &a);

        let back = StockReference { order_id, line_no: 1, direction: StockDirection::In };
        let a = OrderStockSaga::react(&state, &order_id, &stock_moved(back, product_id));
        assert!(a.contains(&SagaAction::Complete));
    }

    #[test]
    fn failed_stock_out_backorders_the_line() {
        let order_id = OrderId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());
        let state = OrderStockState::default();

        let actions = OrderStockSaga::react(&state, &order_id, &line_added(order_id, 2, product_id, 9));
        let failed = actions
            .iter()
            .find(|a| matches!(a, SagaAction::Command { .. }))
            .unwrap();

        let follow = OrderStockSaga::on_command_failed(&state, &order_id, failed, "insufficient available stock");
        match follow.last() {
            Some(SagaAction::Compensate { aggregate_type, command_type, payload }) => {
                assert_eq!(aggregate_type, aggregate_types::ORDER);
                assert_eq!(command_type, BACKORDER_LINE);
                let cmd: BackorderLine = serde_json::from_value(payload.clone()).unwrap();
                assert_eq!(cmd.line_no, 2);
                assert_eq!(cmd.order_id, order_id);
            }
            other => panic!("Expected Compensate action, got {other:?}"),
        }
    }

    #[test]
    fn unrelated_movements_are_not_correlated() {
        let product_id = ProductId::new(AggregateId::new());
        let ev = InventoryEvent::StockMoved(StockMoved {
            product_id,
            movement_no: 1,
            action: StockAction::In,
            quantity: 5,
            note: "Initial stock".to_string(),
            updated_by: None,
            reference: None,
            levels_after: StockLevels::default(),
            occurred_at: Utc::now(),
        });
        assert!(OrderStockSaga::correlate(&env(aggregate_types::INVENTORY_ITEM, AggregateId::new(), 1, &ev)).is_none());
    }
}
