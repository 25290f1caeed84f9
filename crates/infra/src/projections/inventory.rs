//! Inventory read model: current counters per product plus the movement journal.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use woodhop_core::CustomerId;
use woodhop_events::EventEnvelope;
use woodhop_inventory::{InventoryEvent, InventoryItemId, StockAction, StockLevels, UnitOfMeasure};
use woodhop_products::ProductId;

use super::cursor::{ProjectionError, StreamCursors, decode};
use super::Projection;
use crate::aggregate_types;
use crate::read_model::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryView {
    pub product_id: ProductId,
    pub quantity_available: u64,
    pub quantity_reserved: u64,
    pub quantity_damaged: u64,
    pub total_stock: u64,
    pub reorder_level: u64,
    pub reorder_quantity: u64,
    pub uom: UnitOfMeasure,
    pub warehouse_location: String,
    pub is_low_stock: bool,
    pub last_updated: DateTime<Utc>,
}

impl InventoryView {
    fn set_levels(&mut self, levels: StockLevels) {
        self.quantity_available = levels.available;
        self.quantity_reserved = levels.reserved;
        self.quantity_damaged = levels.damaged;
        self.total_stock = levels.total_stock();
        self.refresh_low_stock();
    }

    fn refresh_low_stock(&mut self) {
        self.is_low_stock = self.quantity_available < self.reorder_level;
    }
}

/// One row of the inventory journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementView {
    pub product_id: ProductId,
    pub movement_no: u64,
    pub action: StockAction,
    pub action_label: &'static str,
    pub quantity: u64,
    pub note: String,
    pub updated_by: Option<CustomerId>,
    pub reference: Option<String>,
    pub available_after: u64,
    pub occurred_at: DateTime<Utc>,
}

pub type MovementKey = (ProductId, u64);

#[derive(Debug)]
pub struct InventoryProjection<S, J>
where
    S: ReadStore<ProductId, InventoryView>,
    J: ReadStore<MovementKey, MovementView>,
{
    items: S,
    journal: J,
    cursors: StreamCursors,
}

impl<S, J> InventoryProjection<S, J>
where
    S: ReadStore<ProductId, InventoryView>,
    J: ReadStore<MovementKey, MovementView>,
{
    pub fn new(items: S, journal: J) -> Self {
        Self {
            items,
            journal,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<InventoryView> {
        self.items.get(product_id)
    }

    pub fn list(&self) -> Vec<InventoryView> {
        let mut all = self.items.list();
        all.sort_by_key(|v| v.product_id);
        all
    }

    pub fn low_stock(&self) -> Vec<InventoryView> {
        self.list().into_iter().filter(|v| v.is_low_stock).collect()
    }

    /// Journal rows, newest first; optionally for one product only.
    pub fn journal(&self, product_id: Option<ProductId>) -> Vec<MovementView> {
        let mut rows: Vec<MovementView> = self
            .journal
            .list()
            .into_iter()
            .filter(|m| product_id.is_none_or(|p| m.product_id == p))
            .collect();
        rows.sort_by(|a, b| {
            (b.occurred_at, b.movement_no).cmp(&(a.occurred_at, a.movement_no))
        });
        rows
    }

    pub fn movement(&self, product_id: ProductId, movement_no: u64) -> Option<MovementView> {
        self.journal.get(&(product_id, movement_no))
    }

    fn apply_event(&self, event: InventoryEvent) -> Result<(), ProjectionError> {
        match event {
            InventoryEvent::ItemCreated(e) => {
                let mut view = InventoryView {
                    product_id: e.product_id,
                    quantity_available: 0,
                    quantity_reserved: 0,
                    quantity_damaged: 0,
                    total_stock: 0,
                    reorder_level: e.reorder_level,
                    reorder_quantity: e.reorder_quantity,
                    uom: e.uom,
                    warehouse_location: e.warehouse_location,
                    is_low_stock: false,
                    last_updated: e.occurred_at,
                };
                view.refresh_low_stock();
                self.items.upsert(e.product_id, view);
            }
            InventoryEvent::ItemConfigured(e) => {
                let Some(mut view) = self.items.get(&e.product_id) else {
                    return Err(ProjectionError::StreamMismatch(format!(
                        "configuration for unknown inventory item {}",
                        e.product_id
                    )));
                };
                if let Some(v) = e.reorder_level {
                    view.reorder_level = v;
                }
                if let Some(v) = e.reorder_quantity {
                    view.reorder_quantity = v;
                }
                if let Some(v) = e.uom {
                    view.uom = v;
                }
                if let Some(v) = e.warehouse_location {
                    view.warehouse_location = v;
                }
                view.refresh_low_stock();
                view.last_updated = e.occurred_at;
                self.items.upsert(e.product_id, view);
            }
            InventoryEvent::StockMoved(e) => {
                let Some(mut view) = self.items.get(&e.product_id) else {
                    return Err(ProjectionError::StreamMismatch(format!(
                        "movement for unknown inventory item {}",
                        e.product_id
                    )));
                };
                view.set_levels(e.levels_after);
                view.last_updated = e.occurred_at;
                self.items.upsert(e.product_id, view);

                self.journal.upsert(
                    (e.product_id, e.movement_no),
                    MovementView {
                        product_id: e.product_id,
                        movement_no: e.movement_no,
                        action: e.action,
                        action_label: e.action.label(),
                        quantity: e.quantity,
                        note: e.note,
                        updated_by: e.updated_by,
                        reference: e.reference,
                        available_after: e.levels_after.available,
                        occurred_at: e.occurred_at,
                    },
                );
            }
        }
        Ok(())
    }
}

impl<S, J> Projection for InventoryProjection<S, J>
where
    S: ReadStore<ProductId, InventoryView>,
    J: ReadStore<MovementKey, MovementView>,
{
    fn name(&self) -> &'static str {
        "inventory"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::INVENTORY_ITEM {
            return Ok(());
        }

        self.cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number(), || {
                let event: InventoryEvent = decode(envelope)?;
                if InventoryItemId::for_product(event.product_id()).0 != envelope.aggregate_id() {
                    return Err(ProjectionError::StreamMismatch(
                        "product_id does not match envelope aggregate_id".to_string(),
                    ));
                }
                self.apply_event(event)
            })
    }

    fn reset(&self) {
        self.cursors.clear();
        self.items.clear();
        self.journal.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::test_support::envelope;
    use crate::read_model::InMemoryReadStore;
    use woodhop_core::{AggregateId, AggregateRoot};
    use woodhop_inventory::{CreateItem, InventoryCommand, InventoryItem, RecordMovement};

    type Proj = InventoryProjection<
        InMemoryReadStore<ProductId, InventoryView>,
        InMemoryReadStore<MovementKey, MovementView>,
    >;

    fn projection() -> Proj {
        InventoryProjection::new(InMemoryReadStore::new(), InMemoryReadStore::new())
    }

    fn create(product_id: ProductId, qty: u64) -> InventoryCommand {
        InventoryCommand::CreateItem(CreateItem {
            product_id,
            initial_quantity: qty,
            uom: None,
            reorder_level: None,
            reorder_quantity: None,
            warehouse_location: None,
            updated_by: None,
            occurred_at: Utc::now(),
        })
    }

    fn movement(product_id: ProductId, action: StockAction, quantity: u64) -> InventoryCommand {
        InventoryCommand::RecordMovement(RecordMovement {
            product_id,
            action,
            quantity,
            note: "test".to_string(),
            updated_by: None,
            reference: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn counters_and_journal_follow_movements() {
        let p = projection();
        let product_id = ProductId::new(AggregateId::new());
        let id = InventoryItemId::for_product(product_id);

        let mut item = InventoryItem::empty(id);
        let mut seq = 0;
        for cmd in [
            create(product_id, 30),
            movement(product_id, StockAction::Reserved, 5),
            movement(product_id, StockAction::Out, 18),
        ] {
            for ev in woodhop_events::execute(&mut item, &cmd).unwrap() {
                seq += 1;
                p.apply_envelope(&envelope(aggregate_types::INVENTORY_ITEM, id.0, seq, &ev)).unwrap();
            }
        }

        let view = p.get(&product_id).unwrap();
        assert_eq!(view.quantity_available, 7);
        assert_eq!(view.quantity_reserved, 5);
        assert_eq!(view.total_stock, 12);
        assert!(view.is_low_stock);
        assert_eq!(p.low_stock().len(), 1);

        let journal = p.journal(Some(product_id));
        assert_eq!(journal.len(), 3);
        assert_eq!(p.movement(product_id, 1).unwrap().action, StockAction::In);
        assert_eq!(p.movement(product_id, 3).unwrap().available_after, 7);
        assert_eq!(item.version(), seq);
    }

    #[test]
    fn envelope_on_the_wrong_stream_is_rejected() {
        let p = projection();
        let product_id = ProductId::new(AggregateId::new());
        let mut item = InventoryItem::empty(InventoryItemId::for_product(product_id));
        let events = woodhop_events::execute(&mut item, &create(product_id, 0)).unwrap();

        // Keyed by the product id instead of the derived item id.
        let err = p
            .apply_envelope(&envelope(aggregate_types::INVENTORY_ITEM, product_id.0, 1, &events[0]))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::StreamMismatch(_)));
    }
}
