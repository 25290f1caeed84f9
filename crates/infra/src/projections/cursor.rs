//! Per-stream cursors that make projections idempotent under at-least-once delivery.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use woodhop_core::AggregateId;
use woodhop_events::EventEnvelope;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize {aggregate_type} event: {reason}")]
    Deserialize {
        aggregate_type: String,
        reason: String,
    },

    #[error("event does not belong to its envelope stream: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Last applied sequence number per aggregate stream.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: Mutex<HashMap<AggregateId, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `apply` for a new envelope and advance the cursor when it succeeds.
    ///
    /// - `seq <= last` is a redelivery and is skipped.
    /// - Otherwise `seq` must be `last + 1`; a stream seen for the first time
    ///   must start at 1.
    ///
    /// The lock is held across `apply` so concurrent deliveries of one stream
    /// cannot interleave.
    pub fn advance<F>(&self, aggregate_id: AggregateId, seq: u64, apply: F) -> Result<(), ProjectionError>
    where
        F: FnOnce() -> Result<(), ProjectionError>,
    {
        let mut cursors = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        apply()?;
        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    pub fn position(&self, aggregate_id: AggregateId) -> u64 {
        match self.inner.lock() {
            Ok(cursors) => cursors.get(&aggregate_id).copied().unwrap_or(0),
            Err(poisoned) => poisoned.into_inner().get(&aggregate_id).copied().unwrap_or(0),
        }
    }

    pub fn clear(&self) {
        match self.inner.lock() {
            Ok(mut cursors) => cursors.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

/// Decode an envelope payload into a domain event enum.
pub fn decode<E: DeserializeOwned>(envelope: &EventEnvelope<JsonValue>) -> Result<E, ProjectionError> {
    serde_json::from_value(envelope.payload().clone()).map_err(|e| ProjectionError::Deserialize {
        aggregate_type: envelope.aggregate_type().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_are_skipped_and_gaps_rejected() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();
        let mut applied = Vec::new();

        for seq in [1, 2, 2, 1, 3] {
            cursors
                .advance(id, seq, || {
                    applied.push(seq);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(applied, vec![1, 2, 3]);

        let err = cursors.advance(id, 5, || Ok(())).unwrap_err();
        assert!(matches!(err, ProjectionError::NonMonotonicSequence { last: 3, found: 5 }));

        // A stream whose first event was never applied cannot start midway.
        let fresh = AggregateId::new();
        let err = cursors.advance(fresh, 3, || Ok(())).unwrap_err();
        assert!(matches!(err, ProjectionError::NonMonotonicSequence { last: 0, found: 3 }));
        assert_eq!(cursors.position(fresh), 0);
    }

    #[test]
    fn failed_apply_does_not_move_the_cursor() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();

        let err = cursors.advance(id, 1, || Err(ProjectionError::StreamMismatch("boom".to_string())));
        assert!(err.is_err());
        assert_eq!(cursors.position(id), 0);

        cursors.advance(id, 1, || Ok(())).unwrap();
        assert_eq!(cursors.position(id), 1);
    }
}
