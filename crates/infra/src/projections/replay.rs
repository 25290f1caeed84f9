//! Rebuilding read models from the event log.
//!
//! Read models are disposable: on startup (or on demand) every projection is
//! reset and fed the full log in commit order. Per-stream cursors make a
//! replay over an already-populated projection harmless as well.

use serde::Serialize;
use thiserror::Error;

use serde_json::Value as JsonValue;
use woodhop_events::EventEnvelope;

use crate::event_store::{EventStore, EventStoreError};

use super::Projection;
use super::cursor::ProjectionError;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("projection '{projection}' failed at event {event_id}: {source}")]
    Projection {
        projection: &'static str,
        event_id: uuid::Uuid,
        #[source]
        source: ProjectionError,
    },
}

/// Summary of a finished replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub events: u64,
    pub projections: Vec<&'static str>,
}

/// Reset every projection and replay the whole log into them.
///
/// Stops at the first projection failure; the caller decides whether a
/// partially rebuilt read side is acceptable.
pub fn rebuild_from_scratch<S>(store: &S, projections: &[&dyn Projection]) -> Result<ReplayReport, ReplayError>
where
    S: EventStore + ?Sized,
{
    for p in projections {
        p.reset();
    }

    let log = store.load_all()?;
    let mut report = ReplayReport {
        events: 0,
        projections: projections.iter().map(|p| p.name()).collect(),
    };

    for stored in &log {
        let envelope = stored.to_envelope();
        for p in projections {
            p.apply_envelope(&envelope).map_err(|source| ReplayError::Projection {
                projection: p.name(),
                event_id: stored.event_id,
                source,
            })?;
        }
        report.events += 1;
    }

    tracing::info!(events = report.events, projections = ?report.projections, "read models rebuilt");
    Ok(report)
}

/// Apply one live envelope, filling a sequence gap from the store.
///
/// A gap means the bus dropped or reordered something for this stream; the
/// stream is reloaded and applied in order, and the cursor skips whatever the
/// projection already has.
pub fn apply_or_catch_up<S>(
    store: &S,
    projection: &dyn Projection,
    envelope: &EventEnvelope<JsonValue>,
) -> Result<(), ReplayError>
where
    S: EventStore + ?Sized,
{
    let failed = |event_id, source| ReplayError::Projection {
        projection: projection.name(),
        event_id,
        source,
    };

    match projection.apply_envelope(envelope) {
        Err(ProjectionError::NonMonotonicSequence { last, found }) => {
            tracing::warn!(
                projection = projection.name(),
                aggregate_id = %envelope.aggregate_id(),
                last,
                found,
                "sequence gap, catching up from the store"
            );
            for stored in store.load_stream(envelope.aggregate_id())? {
                projection
                    .apply_envelope(&stored.to_envelope())
                    .map_err(|source| failed(stored.event_id, source))?;
            }
            Ok(())
        }
        Err(source) => Err(failed(envelope.event_id(), source)),
        Ok(()) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use woodhop_core::{AggregateId, ExpectedVersion, Money};
    use woodhop_products::{ProductCreated, ProductEvent, ProductId, ProductUpdated};

    use crate::aggregate_types;
    use crate::event_store::{InMemoryEventStore, UncommittedEvent};
    use crate::projections::CatalogProjection;
    use crate::read_model::InMemoryReadStore;

    #[test]
    fn rebuild_replays_the_log_into_fresh_read_models() {
        let store = InMemoryEventStore::new();
        let product_id = ProductId::new(AggregateId::new());
        let created = ProductEvent::ProductCreated(ProductCreated {
            product_id,
            name: "Mvule slab".to_string(),
            price: Money::from_cents(25_000),
            grade: "Premium".to_string(),
            product_type: "Timber".to_string(),
            category: "Slabs".to_string(),
            dimensions: String::new(),
            description: String::new(),
            vendor: None,
            occurred_at: Utc::now(),
        });
        store
            .append(
                vec![
                    UncommittedEvent::from_typed(product_id.0, aggregate_types::PRODUCT, uuid::Uuid::now_v7(), &created)
                        .unwrap(),
                ],
                ExpectedVersion::Exact(0),
            )
            .unwrap();

        let catalog = CatalogProjection::new(InMemoryReadStore::new());
        let first = rebuild_from_scratch(&store, &[&catalog]).unwrap();
        let second = rebuild_from_scratch(&store, &[&catalog]).unwrap();

        assert_eq!(first.events, 1);
        assert_eq!(second, first);
        assert_eq!(catalog.list().len(), 1);
        assert_eq!(catalog.get(&product_id).unwrap().name, "Mvule slab");
    }

    #[test]
    fn a_gap_in_live_delivery_is_filled_from_the_store() {
        let store = InMemoryEventStore::new();
        let product_id = ProductId::new(AggregateId::new());
        let mut events = vec![ProductEvent::ProductCreated(ProductCreated {
            product_id,
            name: "Pine plank".to_string(),
            price: Money::from_cents(1_500),
            grade: "Standard".to_string(),
            product_type: "Timber".to_string(),
            category: "Planks".to_string(),
            dimensions: "2x4".to_string(),
            description: String::new(),
            vendor: None,
            occurred_at: Utc::now(),
        })];
        for price in [1_600, 1_700] {
            events.push(ProductEvent::ProductUpdated(ProductUpdated {
                product_id,
                name: None,
                price: Some(Money::from_cents(price)),
                grade: None,
                product_type: None,
                category: None,
                dimensions: None,
                description: None,
                occurred_at: Utc::now(),
            }));
        }
        let uncommitted = events
            .iter()
            .map(|e| UncommittedEvent::from_typed(product_id.0, aggregate_types::PRODUCT, uuid::Uuid::now_v7(), e).unwrap())
            .collect();
        let stored = store.append(uncommitted, ExpectedVersion::Exact(0)).unwrap();

        let catalog = CatalogProjection::new(InMemoryReadStore::new());
        apply_or_catch_up(&store, &catalog, &stored[0].to_envelope()).unwrap();
        // The second event never arrives.
        apply_or_catch_up(&store, &catalog, &stored[2].to_envelope()).unwrap();

        assert_eq!(catalog.get(&product_id).unwrap().price, Money::from_cents(1_700));

        // A stream whose creation was lost is reloaded from the start.
        let fresh = CatalogProjection::new(InMemoryReadStore::new());
        apply_or_catch_up(&store, &fresh, &stored[1].to_envelope()).unwrap();
        let view = fresh.get(&product_id).unwrap();
        assert_eq!(view.name, "Pine plank");
        assert_eq!(view.price, Money::from_cents(1_700));
    }
}
