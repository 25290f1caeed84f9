//! Read model builders.
//!
//! Projections consume committed envelopes and maintain query-optimized views.
//! All of them are:
//! - **Rebuildable**: reset and replayed from the event log at startup
//! - **Idempotent**: per-stream cursors drop redeliveries
//! - **Selective**: envelopes of other aggregate types are ignored

use std::sync::Arc;

use serde_json::Value as JsonValue;

use woodhop_events::EventEnvelope;

pub mod catalog;
pub mod customers;
pub mod cursor;
pub mod inventory;
pub mod orders;
pub mod replay;
pub mod suppliers;

pub use catalog::{CatalogProjection, ProductView, ShopFilter};
pub use cursor::{ProjectionError, StreamCursors};
pub use customers::{CustomerDirectoryProjection, CustomerView};
pub use inventory::{InventoryProjection, InventoryView, MovementKey, MovementView};
pub use orders::{OrderView, OrdersProjection};
pub use replay::{ReplayError, ReplayReport, apply_or_catch_up, rebuild_from_scratch};
pub use suppliers::{SupplierDirectoryProjection, SupplierView};

/// A read model fed from the event bus.
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Apply one envelope. Must be safe to call again with an envelope that was
    /// already applied.
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Drop all state (rebuild support).
    fn reset(&self);
}

impl<P> Projection for Arc<P>
where
    P: Projection + ?Sized,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        (**self).apply_envelope(envelope)
    }

    fn reset(&self) {
        (**self).reset()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use serde::Serialize;
    use serde_json::Value as JsonValue;
    use uuid::Uuid;

    use woodhop_core::AggregateId;
    use woodhop_events::EventEnvelope;

    pub(crate) fn envelope<E: Serialize>(
        aggregate_type: &str,
        aggregate_id: AggregateId,
        sequence_number: u64,
        event: &E,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            aggregate_id,
            aggregate_type,
            sequence_number,
            Utc::now(),
            serde_json::to_value(event).unwrap(),
        )
    }
}
