//! Inventory domain module (event-sourced).
//!
//! One stock item per catalog product. Counters only change through typed
//! stock movements (`StockMoved`), and every movement is kept in the stream, so
//! the stream doubles as the inventory journal.

pub mod item;
pub mod movement;

pub use item::{
    ConfigureItem, CreateItem, DEFAULT_REORDER_LEVEL, DEFAULT_REORDER_QUANTITY, InventoryCommand,
    InventoryEvent, InventoryItem, InventoryItemId, ItemConfigured, ItemCreated, RecordMovement,
    StockMoved,
};
pub use movement::{StockAction, StockLevels, UnitOfMeasure};
