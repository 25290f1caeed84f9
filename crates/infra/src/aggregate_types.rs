//! Stream type names stored next to every event.
//!
//! A stream keeps the type it was created with; appending under a different
//! type is rejected by the event store.

pub const PRODUCT: &str = "catalog.product";
pub const INVENTORY_ITEM: &str = "inventory.item";
pub const CUSTOMER: &str = "parties.customer";
pub const SUPPLIER: &str = "parties.supplier";
pub const ORDER: &str = "sales.order";

/// Saga streams share the store but are never published on the bus.
pub const ORDER_STOCK_SAGA: &str = "saga.order_stock";
