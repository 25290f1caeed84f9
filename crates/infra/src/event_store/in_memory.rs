use std::collections::HashMap;
use std::sync::RwLock;

use woodhop_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<AggregateId, Vec<StoredEvent>>,
    /// Every committed event, in commit order.
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store for tests and the default dev server.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some((aggregate_id, aggregate_type)) = validate_batch(&events)? else {
            return Ok(vec![]);
        };

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        let stream = inner.streams.entry(aggregate_id).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(current + 1..)
            .map(|(e, sequence_number)| StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            })
            .collect();

        stream.extend(committed.iter().cloned());
        inner.log.extend(committed.iter().cloned());

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner.log.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.event".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({"n": 1}),
        }
    }

    #[test]
    fn sequence_numbers_are_per_stream_and_log_is_global() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        store
            .append(vec![event(a, "order"), event(a, "order")], ExpectedVersion::Exact(0))
            .unwrap();
        let committed = store.append(vec![event(b, "order")], ExpectedVersion::Exact(0)).unwrap();
        store.append(vec![event(a, "order")], ExpectedVersion::Exact(2)).unwrap();

        assert_eq!(committed[0].sequence_number, 1);
        assert_eq!(store.load_stream(a).unwrap().len(), 3);

        let all = store.load_all().unwrap();
        let ids: Vec<_> = all.iter().map(|e| (e.aggregate_id, e.sequence_number)).collect();
        assert_eq!(ids, vec![(a, 1), (a, 2), (b, 1), (a, 3)]);
    }

    #[test]
    fn stale_expected_version_is_concurrency_error() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        store.append(vec![event(a, "order")], ExpectedVersion::Exact(0)).unwrap();

        match store.append(vec![event(a, "order")], ExpectedVersion::Exact(0)) {
            Err(EventStoreError::Concurrency(_)) => {}
            other => panic!("Expected Concurrency error, got {other:?}"),
        }
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn stream_keeps_its_aggregate_type() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        store.append(vec![event(a, "order")], ExpectedVersion::Any).unwrap();

        assert!(matches!(
            store.append(vec![event(a, "product")], ExpectedVersion::Any),
            Err(EventStoreError::AggregateTypeMismatch(_))
        ));
    }

    #[test]
    fn mixed_batches_are_rejected() {
        let store = InMemoryEventStore::new();
        let batch = vec![event(AggregateId::new(), "order"), event(AggregateId::new(), "order")];
        assert!(matches!(
            store.append(batch, ExpectedVersion::Any),
            Err(EventStoreError::InvalidAppend(_))
        ));
    }
}
