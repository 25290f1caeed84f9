//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate stream
//!   ↓
//! 2. Validate and rehydrate (fold history into a fresh aggregate)
//!   ↓
//! 3. Handle (pure decision, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(current)
//!   ↓
//! 5. Publish the committed events to the bus
//! ```
//!
//! A lost optimistic-concurrency race reloads and re-decides a few times before
//! giving up; decisions are pure, so retrying is safe. An aggregate that
//! decides "nothing to do" (empty event list) appends and publishes nothing.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use woodhop_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use woodhop_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

const MAX_CONCURRENCY_RETRIES: usize = 3;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale stream version after retries.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Business conflict (duplicate creation, already verified, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// Stored payloads did not decode into the aggregate's event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Events are committed but publication failed; republishing is safe.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::Publish(msg) => DispatchError::Publish(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and bus so tests run on `InMemoryEventStore` and
/// `InMemoryEventBus` while the server can swap in Postgres.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `command` against the aggregate stored under `aggregate_id`.
    ///
    /// `make_aggregate` builds the empty instance to rehydrate (e.g.
    /// `|id| InventoryItem::empty(InventoryItemId::new(id))`). Returns the
    /// committed events with their sequence numbers.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: woodhop_events::Event + Serialize + DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_dispatch(aggregate_id, aggregate_type, &command, &make_aggregate) {
                Err(DispatchError::Concurrency(msg)) if attempt < MAX_CONCURRENCY_RETRIES => {
                    tracing::debug!(%aggregate_id, aggregate_type, attempt, %msg, "retrying after concurrency conflict");
                }
                Err(err) => return Err(err),
                Ok(committed) => {
                    for stored in &committed {
                        self.bus
                            .publish(stored.to_envelope())
                            .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
                    }
                    return Ok(committed);
                }
            }
        }
    }

    /// Load and rehydrate without dispatching a command.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    fn try_dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: &impl Fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: woodhop_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.store.append(uncommitted, expected)?)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    use woodhop_core::Money;
    use woodhop_events::InMemoryEventBus;
    use woodhop_products::{CreateProduct, Product, ProductCommand, ProductId, RemoveProduct};

    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn create(product_id: ProductId) -> ProductCommand {
        ProductCommand::CreateProduct(CreateProduct {
            product_id,
            name: "Oak beam".to_string(),
            price: Money::from_cents(12_000),
            grade: None,
            product_type: "Timber".to_string(),
            category: "Beams".to_string(),
            dimensions: "4x4".to_string(),
            description: String::new(),
            vendor: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_appends_then_publishes() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let id = AggregateId::new();

        let committed = d
            .dispatch(id, "catalog.product", create(ProductId::new(id)), |id| {
                Product::empty(ProductId::new(id))
            })
            .unwrap();

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].event_type, "catalog.product.created");
        let env = sub.try_recv().unwrap();
        assert_eq!(env.aggregate_id(), id);
        assert_eq!(env.sequence_number(), 1);
    }

    #[test]
    fn domain_errors_are_mapped_and_nothing_is_published() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let id = AggregateId::new();
        let make = |id| Product::empty(ProductId::new(id));

        let err = d
            .dispatch(
                id,
                "catalog.product",
                ProductCommand::RemoveProduct(RemoveProduct {
                    product_id: ProductId::new(id),
                    occurred_at: Utc::now(),
                }),
                make,
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));

        d.dispatch(id, "catalog.product", create(ProductId::new(id)), make).unwrap();
        let err = d
            .dispatch(id, "catalog.product", create(ProductId::new(id)), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));

        assert_eq!(d.store().load_stream(id).unwrap().len(), 1);
        assert!(sub.try_recv().is_ok());
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn load_rehydrates_current_state() {
        let d = dispatcher();
        let id = AggregateId::new();
        d.dispatch(id, "catalog.product", create(ProductId::new(id)), |id| {
            Product::empty(ProductId::new(id))
        })
        .unwrap();

        let product = d.load(id, |id| Product::empty(ProductId::new(id))).unwrap();
        assert!(product.is_created());
        assert_eq!(product.name(), "Oak beam");
    }
}
