use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use woodhop_core::{Aggregate, AggregateId, AggregateRoot, CustomerId, DomainError};
use woodhop_events::Event;
use woodhop_products::ProductId;

use crate::movement::{StockAction, StockLevels, UnitOfMeasure};

pub const DEFAULT_REORDER_LEVEL: u64 = 10;
pub const DEFAULT_REORDER_QUANTITY: u64 = 20;

/// Namespace for deriving an item id from its product id.
const ITEM_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_2c0e_93d4_4c57_a8e1_52f0_7d3b_9a41);

/// Inventory item identifier.
///
/// Derived from the product id (UUID v5), so each product has exactly one item
/// stream without sharing the product's own stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryItemId(pub AggregateId);

impl InventoryItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn for_product(product_id: ProductId) -> Self {
        let uuid = Uuid::new_v5(&ITEM_NAMESPACE, product_id.0.as_uuid().as_bytes());
        Self(AggregateId::from_uuid(uuid))
    }
}

impl core::fmt::Display for InventoryItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: InventoryItem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: InventoryItemId,
    product_id: Option<ProductId>,
    levels: StockLevels,
    reorder_level: u64,
    reorder_quantity: u64,
    uom: UnitOfMeasure,
    warehouse_location: String,
    last_updated: Option<DateTime<Utc>>,
    /// Movement references already applied (redelivery guard).
    applied_references: BTreeSet<String>,
    movements_recorded: u64,
    version: u64,
    created: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            product_id: None,
            levels: StockLevels::default(),
            reorder_level: DEFAULT_REORDER_LEVEL,
            reorder_quantity: DEFAULT_REORDER_QUANTITY,
            uom: UnitOfMeasure::default(),
            warehouse_location: String::new(),
            last_updated: None,
            applied_references: BTreeSet::new(),
            movements_recorded: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    /// The tracked product, once the item exists.
    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn levels(&self) -> StockLevels {
        self.levels
    }

    pub fn quantity_available(&self) -> u64 {
        self.levels.available
    }

    pub fn quantity_reserved(&self) -> u64 {
        self.levels.reserved
    }

    pub fn quantity_damaged(&self) -> u64 {
        self.levels.damaged
    }

    pub fn total_stock(&self) -> u64 {
        self.levels.total_stock()
    }

    pub fn reorder_level(&self) -> u64 {
        self.reorder_level
    }

    pub fn is_low_stock(&self) -> bool {
        self.levels.available < self.reorder_level
    }

    pub fn uom(&self) -> UnitOfMeasure {
        self.uom
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn movements_recorded(&self) -> u64 {
        self.movements_recorded
    }

    pub fn has_applied(&self, reference: &str) -> bool {
        self.applied_references.contains(reference)
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateItem (opens stock tracking for a product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItem {
    pub product_id: ProductId,
    pub initial_quantity: u64,
    pub uom: Option<UnitOfMeasure>,
    pub reorder_level: Option<u64>,
    pub reorder_quantity: Option<u64>,
    pub warehouse_location: Option<String>,
    pub updated_by: Option<CustomerId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfigureItem (reorder thresholds, unit, location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureItem {
    pub product_id: ProductId,
    pub reorder_level: Option<u64>,
    pub reorder_quantity: Option<u64>,
    pub uom: Option<UnitOfMeasure>,
    pub warehouse_location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement (a journal entry that adjusts the counters).
///
/// `reference` makes the movement idempotent: a second movement with the same
/// reference is accepted and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub product_id: ProductId,
    pub action: StockAction,
    pub quantity: u64,
    pub note: String,
    pub updated_by: Option<CustomerId>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateItem(CreateItem),
    ConfigureItem(ConfigureItem),
    RecordMovement(RecordMovement),
}

/// Event: ItemCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub product_id: ProductId,
    pub uom: UnitOfMeasure,
    pub reorder_level: u64,
    pub reorder_quantity: u64,
    pub warehouse_location: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemConfigured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemConfigured {
    pub product_id: ProductId,
    pub reorder_level: Option<u64>,
    pub reorder_quantity: Option<u64>,
    pub uom: Option<UnitOfMeasure>,
    pub warehouse_location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoved: one inventory journal entry.
///
/// Carries the counters after the movement so the journal explains every
/// counter value without replaying the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub product_id: ProductId,
    /// 1-based position of this movement in the item's journal.
    pub movement_no: u64,
    pub action: StockAction,
    pub quantity: u64,
    pub note: String,
    pub updated_by: Option<CustomerId>,
    pub reference: Option<String>,
    pub levels_after: StockLevels,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemCreated(ItemCreated),
    ItemConfigured(ItemConfigured),
    StockMoved(StockMoved),
}

impl InventoryEvent {
    pub fn product_id(&self) -> ProductId {
        match self {
            InventoryEvent::ItemCreated(e) => e.product_id,
            InventoryEvent::ItemConfigured(e) => e.product_id,
            InventoryEvent::StockMoved(e) => e.product_id,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemCreated(_) => "inventory.item.created",
            InventoryEvent::ItemConfigured(_) => "inventory.item.configured",
            InventoryEvent::StockMoved(_) => "inventory.item.stock_moved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemCreated(e) => e.occurred_at,
            InventoryEvent::ItemConfigured(e) => e.occurred_at,
            InventoryEvent::StockMoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemCreated(e) => {
                self.id = InventoryItemId::for_product(e.product_id);
                self.product_id = Some(e.product_id);
                self.uom = e.uom;
                self.reorder_level = e.reorder_level;
                self.reorder_quantity = e.reorder_quantity;
                self.warehouse_location = e.warehouse_location.clone();
                self.levels = StockLevels::default();
                self.last_updated = Some(e.occurred_at);
                self.created = true;
            }
            InventoryEvent::ItemConfigured(e) => {
                if let Some(v) = e.reorder_level {
                    self.reorder_level = v;
                }
                if let Some(v) = e.reorder_quantity {
                    self.reorder_quantity = v;
                }
                if let Some(v) = e.uom {
                    self.uom = v;
                }
                if let Some(v) = &e.warehouse_location {
                    self.warehouse_location = v.clone();
                }
                self.last_updated = Some(e.occurred_at);
            }
            InventoryEvent::StockMoved(e) => {
                self.levels = e.levels_after;
                self.movements_recorded = e.movement_no;
                if let Some(reference) = &e.reference {
                    self.applied_references.insert(reference.clone());
                }
                self.last_updated = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateItem(cmd) => self.handle_create(cmd),
            InventoryCommand::ConfigureItem(cmd) => self.handle_configure(cmd),
            InventoryCommand::RecordMovement(cmd) => self.handle_movement(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_product(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != InventoryItemId::for_product(product_id) {
            return Err(DomainError::invariant("product_id does not match inventory item"));
        }
        Ok(())
    }

    fn opened_with_defaults(product_id: ProductId, at: DateTime<Utc>) -> ItemCreated {
        ItemCreated {
            product_id,
            uom: UnitOfMeasure::default(),
            reorder_level: DEFAULT_REORDER_LEVEL,
            reorder_quantity: DEFAULT_REORDER_QUANTITY,
            warehouse_location: String::new(),
            occurred_at: at,
        }
    }

    fn handle_create(&self, cmd: &CreateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("inventory already exists for this product"));
        }
        self.ensure_product(cmd.product_id)?;

        let mut events = vec![InventoryEvent::ItemCreated(ItemCreated {
            product_id: cmd.product_id,
            uom: cmd.uom.unwrap_or_default(),
            reorder_level: cmd.reorder_level.unwrap_or(DEFAULT_REORDER_LEVEL),
            reorder_quantity: cmd.reorder_quantity.unwrap_or(DEFAULT_REORDER_QUANTITY),
            warehouse_location: cmd.warehouse_location.clone().unwrap_or_default(),
            occurred_at: cmd.occurred_at,
        })];

        if cmd.initial_quantity > 0 {
            events.push(InventoryEvent::StockMoved(StockMoved {
                product_id: cmd.product_id,
                movement_no: 1,
                action: StockAction::In,
                quantity: cmd.initial_quantity,
                note: "Initial stock".to_string(),
                updated_by: cmd.updated_by,
                reference: None,
                levels_after: StockLevels::default().after(StockAction::In, cmd.initial_quantity)?,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_configure(&self, cmd: &ConfigureItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_product(cmd.product_id)?;

        if cmd.reorder_level.is_none()
            && cmd.reorder_quantity.is_none()
            && cmd.uom.is_none()
            && cmd.warehouse_location.is_none()
        {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::ItemConfigured(ItemConfigured {
            product_id: cmd.product_id,
            reorder_level: cmd.reorder_level,
            reorder_quantity: cmd.reorder_quantity,
            uom: cmd.uom,
            warehouse_location: cmd.warehouse_location.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_movement(&self, cmd: &RecordMovement) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_product(cmd.product_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        if let Some(reference) = &cmd.reference {
            if reference.trim().is_empty() {
                return Err(DomainError::validation("reference cannot be blank"));
            }
            if self.applied_references.contains(reference) {
                return Ok(vec![]);
            }
        }

        let mut events = Vec::with_capacity(2);
        if !self.created {
            events.push(InventoryEvent::ItemCreated(Self::opened_with_defaults(
                cmd.product_id,
                cmd.occurred_at,
            )));
        }

        let levels_after = self.levels.after(cmd.action, cmd.quantity)?;

        events.push(InventoryEvent::StockMoved(StockMoved {
            product_id: cmd.product_id,
            movement_no: self.movements_recorded + 1,
            action: cmd.action,
            quantity: cmd.quantity,
            note: cmd.note.clone(),
            updated_by: cmd.updated_by,
            reference: cmd.reference.clone(),
            levels_after,
            occurred_at: cmd.occurred_at,
        }));

        Ok(events)
    }
}
