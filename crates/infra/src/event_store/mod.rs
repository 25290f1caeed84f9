//! Append-only event store boundary.
//!
//! Storage-agnostic trait plus the in-memory and Postgres backends.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Adapter that publishes committed events to an `EventBus` after a successful append.
///
/// Publish happens only after the append succeeded, never before.
pub struct PublishingEventStore<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PublishingEventStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> EventStore for PublishingEventStore<S, B>
where
    S: EventStore,
    B: woodhop_events::EventBus<woodhop_events::EventEnvelope<serde_json::Value>>,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: woodhop_core::ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let committed = self.store.append(events, expected_version)?;

        for e in &committed {
            self.bus
                .publish(e.to_envelope())
                .map_err(|err| EventStoreError::Publish(format!("{err:?}")))?;
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        aggregate_id: woodhop_core::AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.store.load_stream(aggregate_id)
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.store.load_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use chrono::Utc;
    use woodhop_core::{AggregateId, ExpectedVersion};
    use woodhop_events::{EventBus, EventEnvelope, InMemoryEventBus};

    use crate::aggregate_types;

    fn movement(aggregate_id: AggregateId) -> UncommittedEvent {
        UncommittedEvent {
            event_id: uuid::Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_types::INVENTORY_ITEM.to_string(),
            event_type: "inventory.item.stock_moved".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({ "quantity": 4 }),
        }
    }

    #[test]
    fn publishes_only_what_was_committed() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> = Arc::new(InMemoryEventBus::new());
        let subscription = bus.subscribe();
        let store = PublishingEventStore::new(InMemoryEventStore::new(), bus.clone());
        let item = AggregateId::new();

        let committed = store.append(vec![movement(item)], ExpectedVersion::Exact(0)).unwrap();
        let published = subscription.try_recv().unwrap();
        assert_eq!(published.aggregate_id(), item);
        assert_eq!(published.sequence_number(), committed[0].sequence_number);

        assert!(store.append(vec![movement(item)], ExpectedVersion::Exact(0)).is_err());
        assert!(subscription.try_recv().is_err());

        let (inner, _) = store.into_parts();
        assert_eq!(inner.load_stream(item).unwrap().len(), 1);
    }
}
