//! Saga / process manager mechanics (framework only, no business rules).
//!
//! - A saga instance is identified by a correlation id (e.g. an order id).
//! - Infra derives a deterministic saga stream id from that correlation and
//!   persists saga events there; state is rebuilt by folding them with `apply`.
//! - `SagaAction::Command` / `Compensate` target other aggregates; infra routes
//!   them through a command executor.
//! - Runners may deliver the same domain event twice. Sagas must make their
//!   reactions idempotent through their state.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use woodhop_core::AggregateId;

use crate::EventEnvelope;

/// Actions a saga can emit in response to an incoming domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SagaAction {
    /// Append a saga event (JSON payload) to this saga's stream.
    Emit {
        event_type: String,
        payload: JsonValue,
    },
    /// Dispatch a command to a target aggregate.
    Command {
        aggregate_type: String,
        command_type: String,
        payload: JsonValue,
    },
    /// Dispatch a command that undoes or records the failure of an earlier step.
    Compensate {
        aggregate_type: String,
        command_type: String,
        payload: JsonValue,
    },
    /// Saga reached a terminal state.
    Complete,
}

pub trait Saga: Send + Sync + 'static {
    type State: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static;
    type SagaEvent: Serialize + DeserializeOwned + Send + Sync + 'static;
    type CorrelationId: Clone + Send + Sync + 'static;

    /// Stable saga type, used as the aggregate type of saga streams.
    fn saga_type() -> &'static str;

    /// Route a domain event to a saga instance (None when irrelevant).
    fn correlate(envelope: &EventEnvelope<JsonValue>) -> Option<Self::CorrelationId>;

    fn saga_id(correlation: &Self::CorrelationId) -> AggregateId;

    fn initial_state(_correlation: &Self::CorrelationId) -> Self::State {
        Self::State::default()
    }

    fn apply(state: &mut Self::State, event: &Self::SagaEvent);

    fn react(
        state: &Self::State,
        correlation: &Self::CorrelationId,
        incoming: &EventEnvelope<JsonValue>,
    ) -> Vec<SagaAction>;

    /// Called when a `Command` action was rejected by its target aggregate.
    /// Infrastructure failures never get here; the runner returns them.
    ///
    /// Returns follow-up actions (usually a saga event plus a `Compensate`).
    fn on_command_failed(
        _state: &Self::State,
        _correlation: &Self::CorrelationId,
        _failed: &SagaAction,
        _reason: &str,
    ) -> Vec<SagaAction> {
        Vec::new()
    }
}
