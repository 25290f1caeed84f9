//! Saga infrastructure: persistence, command execution and the runner loop.

pub mod executor;
pub mod order_stock;

use std::marker::PhantomData;

use serde_json::Value as JsonValue;
use thiserror::Error;

use woodhop_core::{AggregateId, ExpectedVersion};
use woodhop_events::{EventEnvelope, Saga, SagaAction};

use crate::command_dispatcher::DispatchError;
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

pub use executor::DispatchingExecutor;
pub use order_stock::{OrderStockEvent, OrderStockSaga, OrderStockState, StockDirection, StockReference};

#[derive(Debug, Error)]
pub enum SagaError {
    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("failed to decode saga event: {0}")]
    Decode(String),

    #[error("no route for command {aggregate_type}/{command_type}")]
    UnknownCommand {
        aggregate_type: String,
        command_type: String,
    },

    #[error("command payload is invalid: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A command failed for a reason other than a business rejection
    /// (store outage, exhausted retries); the triggering envelope should be
    /// handled again later.
    #[error("saga command {aggregate_type}/{command_type} failed: {reason}")]
    CommandFailed {
        aggregate_type: String,
        command_type: String,
        reason: String,
    },
}

impl SagaError {
    /// The target aggregate refused the command on its own rules.
    pub fn is_rejection(&self) -> bool {
        matches!(self, SagaError::Dispatch(DispatchError::InvariantViolation(_)))
    }
}

/// Repository for persisting saga events via the event store.
///
/// Saga streams live next to aggregate streams, typed by `S::saga_type()`.
pub struct SagaRepository<S: Saga, E: EventStore> {
    event_store: E,
    _phantom: PhantomData<S>,
}

impl<S: Saga, E: EventStore> SagaRepository<S, E> {
    pub fn new(event_store: E) -> Self {
        Self {
            event_store,
            _phantom: PhantomData,
        }
    }

    /// Load saga event history for a saga instance.
    pub fn load(&self, saga_id: AggregateId) -> Result<Vec<StoredEvent>, SagaError> {
        Ok(self.event_store.load_stream(saga_id)?)
    }

    /// Rebuild the state of one saga instance.
    pub fn load_state(&self, saga_id: AggregateId, correlation: &S::CorrelationId) -> Result<S::State, SagaError> {
        let mut state = S::initial_state(correlation);
        for stored in self.load(saga_id)? {
            let event: S::SagaEvent =
                serde_json::from_value(stored.payload).map_err(|e| SagaError::Decode(e.to_string()))?;
            S::apply(&mut state, &event);
        }
        Ok(state)
    }

    /// Append a saga event (Emit action).
    pub fn append_emit(
        &self,
        saga_id: AggregateId,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<Vec<StoredEvent>, SagaError> {
        let uncommitted = UncommittedEvent {
            event_id: uuid::Uuid::now_v7(),
            aggregate_id: saga_id,
            aggregate_type: S::saga_type().to_string(),
            event_type: format!("{}.{}", S::saga_type(), event_type),
            event_version: 1,
            occurred_at: chrono::Utc::now(),
            payload,
        };
        Ok(self.event_store.append(vec![uncommitted], ExpectedVersion::Any)?)
    }
}

/// Command executor trait for saga actions.
pub trait CommandExecutor: Send + Sync {
    type Error: std::fmt::Display;

    fn execute(&self, aggregate_type: &str, command_type: &str, payload: &JsonValue) -> Result<(), Self::Error>;

    /// Whether `error` is a business rejection of the command. Only
    /// rejections reach `Saga::on_command_failed`; anything else is returned
    /// to the caller so the envelope can be retried.
    fn is_rejection(&self, _error: &Self::Error) -> bool {
        false
    }
}

/// Outcome of `SagaRunner::resume`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeReport {
    pub envelopes: u64,
    pub failures: u64,
}

/// Drives one saga type: correlate → load state → react → run actions.
///
/// Emitted saga events are persisted before the next action runs, so a crash
/// between steps replays at most the command that was in flight; targets must
/// treat those idempotently (movement references, backorder flags).
pub struct SagaRunner<S: Saga, E: EventStore, X: CommandExecutor> {
    repository: SagaRepository<S, E>,
    executor: X,
}

impl<S, E, X> SagaRunner<S, E, X>
where
    S: Saga,
    E: EventStore,
    X: CommandExecutor,
{
    pub fn new(event_store: E, executor: X) -> Self {
        Self {
            repository: SagaRepository::new(event_store),
            executor,
        }
    }

    pub fn repository(&self) -> &SagaRepository<S, E> {
        &self.repository
    }

    /// Feed the committed log through the saga, in commit order.
    ///
    /// Picks up work that was committed while no runner was listening or
    /// whose handling failed. Events committed by the resumed steps are fed
    /// too, until the log stops growing. Saga state and movement references
    /// make already-handled envelopes no-ops; a failing envelope is logged
    /// and left for the next resume.
    pub fn resume(&self) -> Result<ResumeReport, SagaError> {
        let mut report = ResumeReport::default();
        let mut seen = 0;
        loop {
            let log = self.repository.event_store.load_all()?;
            if log.len() <= seen {
                break;
            }
            for stored in &log[seen..] {
                if stored.aggregate_type == S::saga_type() {
                    continue;
                }
                report.envelopes += 1;
                if let Err(err) = self.handle(&stored.to_envelope()) {
                    report.failures += 1;
                    tracing::warn!(saga = S::saga_type(), event_id = %stored.event_id, error = %err, "saga resume step failed");
                }
            }
            seen = log.len();
        }
        tracing::info!(saga = S::saga_type(), envelopes = report.envelopes, failures = report.failures, "saga resumed");
        Ok(report)
    }

    /// React to one committed envelope. Irrelevant envelopes are ignored.
    pub fn handle(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), SagaError> {
        let Some(correlation) = S::correlate(envelope) else {
            return Ok(());
        };
        let saga_id = S::saga_id(&correlation);
        let mut state = self.repository.load_state(saga_id, &correlation)?;

        let actions = S::react(&state, &correlation, envelope);
        if actions.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            saga = S::saga_type(),
            %saga_id,
            source = envelope.aggregate_type(),
            actions = actions.len(),
            "saga reacting"
        );
        self.run(saga_id, &correlation, &mut state, actions)
    }

    fn run(
        &self,
        saga_id: AggregateId,
        correlation: &S::CorrelationId,
        state: &mut S::State,
        actions: Vec<SagaAction>,
    ) -> Result<(), SagaError> {
        for action in actions {
            match &action {
                SagaAction::Emit { event_type, payload } => {
                    let event: S::SagaEvent =
                        serde_json::from_value(payload.clone()).map_err(|e| SagaError::Decode(e.to_string()))?;
                    self.repository.append_emit(saga_id, event_type, payload.clone())?;
                    S::apply(state, &event);
                }
                SagaAction::Command { aggregate_type, command_type, payload } => {
                    if let Err(err) = self.executor.execute(aggregate_type, command_type, payload) {
                        let reason = err.to_string();
                        if !self.executor.is_rejection(&err) {
                            return Err(SagaError::CommandFailed {
                                aggregate_type: aggregate_type.clone(),
                                command_type: command_type.clone(),
                                reason,
                            });
                        }
                        tracing::warn!(
                            saga = S::saga_type(),
                            %saga_id,
                            aggregate_type = %aggregate_type,
                            command_type = %command_type,
                            %reason,
                            "saga command rejected"
                        );
                        let follow_up = S::on_command_failed(state, correlation, &action, &reason);
                        self.run(saga_id, correlation, state, follow_up)?;
                    }
                }
                SagaAction::Compensate { aggregate_type, command_type, payload } => {
                    if let Err(err) = self.executor.execute(aggregate_type, command_type, payload) {
                        tracing::error!(
                            saga = S::saga_type(),
                            %saga_id,
                            aggregate_type = %aggregate_type,
                            command_type = %command_type,
                            error = %err,
                            "saga compensation failed"
                        );
                    }
                }
                SagaAction::Complete => {
                    tracing::info!(saga = S::saga_type(), %saga_id, "saga completed");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use woodhop_core::{CustomerId, Money};
    use woodhop_products::ProductId;
    use woodhop_sales::{LineAdded, OrderEvent, OrderId, OrderLine};

    use crate::aggregate_types;
    use crate::event_store::InMemoryEventStore;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Mode {
        Healthy,
        Outage,
        ShortStock,
    }

    /// Records every command; stock movements fail according to `mode`.
    struct ScriptedExecutor {
        mode: Mutex<Mode>,
        seen: Mutex<Vec<(String, JsonValue)>>,
    }

    impl ScriptedExecutor {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                mode: Mutex::new(mode),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn set(&self, mode: Mode) {
            *self.mode.lock().unwrap() = mode;
        }

        fn commands(&self, command_type: &str) -> Vec<JsonValue> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == command_type)
                .map(|(_, p)| p.clone())
                .collect()
        }
    }

    impl CommandExecutor for Arc<ScriptedExecutor> {
        type Error = SagaError;

        fn execute(&self, _aggregate_type: &str, command_type: &str, payload: &JsonValue) -> Result<(), SagaError> {
            self.seen.lock().unwrap().push((command_type.to_string(), payload.clone()));
            if command_type != order_stock::RECORD_MOVEMENT {
                return Ok(());
            }
            match *self.mode.lock().unwrap() {
                Mode::Healthy => Ok(()),
                Mode::Outage => Err(SagaError::Dispatch(DispatchError::Concurrency(
                    "stream kept moving during retries".to_string(),
                ))),
                Mode::ShortStock => Err(SagaError::Dispatch(DispatchError::InvariantViolation(
                    "insufficient available stock".to_string(),
                ))),
            }
        }

        fn is_rejection(&self, error: &SagaError) -> bool {
            error.is_rejection()
        }
    }

    fn line_added(order_id: OrderId, quantity: u64) -> EventEnvelope<JsonValue> {
        let event = OrderEvent::LineAdded(LineAdded {
            order_id,
            line: OrderLine {
                line_no: 1,
                product_id: ProductId::new(AggregateId::new()),
                vendor_id: None::<CustomerId>,
                quantity,
                unit_price: Money::from_cents(900),
                subtotal: Money::from_cents(900 * quantity),
                backordered: false,
                removed: false,
            },
            occurred_at: Utc::now(),
        });
        EventEnvelope::new(
            uuid::Uuid::now_v7(),
            order_id.0,
            aggregate_types::ORDER,
            2,
            Utc::now(),
            serde_json::to_value(&event).unwrap(),
        )
    }

    fn runner(executor: &Arc<ScriptedExecutor>) -> SagaRunner<OrderStockSaga, Arc<InMemoryEventStore>, Arc<ScriptedExecutor>> {
        SagaRunner::new(Arc::new(InMemoryEventStore::new()), executor.clone())
    }

    fn line_state(runner: &SagaRunner<OrderStockSaga, Arc<InMemoryEventStore>, Arc<ScriptedExecutor>>, order_id: OrderId) -> order_stock::LineStock {
        let saga_id = OrderStockSaga::saga_id(&order_id);
        let state = runner.repository().load_state(saga_id, &order_id).unwrap();
        state.lines.get(&1).cloned().unwrap_or_default()
    }

    #[test]
    fn infrastructure_failure_is_returned_and_retried_not_backordered() {
        let executor = ScriptedExecutor::new(Mode::Outage);
        let runner = runner(&executor);
        let order_id = OrderId::new(AggregateId::new());
        let incoming = line_added(order_id, 3);

        let err = runner.handle(&incoming).unwrap_err();
        assert!(matches!(err, SagaError::CommandFailed { .. }));
        assert!(!line_state(&runner, order_id).backordered);
        assert!(executor.commands(order_stock::BACKORDER_LINE).is_empty());

        executor.set(Mode::Healthy);
        runner.handle(&incoming).unwrap();

        let movements = executor.commands(order_stock::RECORD_MOVEMENT);
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0]["reference"], movements[1]["reference"]);
        assert!(executor.commands(order_stock::BACKORDER_LINE).is_empty());
        assert!(!line_state(&runner, order_id).backordered);
    }

    #[test]
    fn stock_rejection_backorders_the_line() {
        let executor = ScriptedExecutor::new(Mode::ShortStock);
        let runner = runner(&executor);
        let order_id = OrderId::new(AggregateId::new());

        runner.handle(&line_added(order_id, 50)).unwrap();

        assert!(line_state(&runner, order_id).backordered);
        let backorders = executor.commands(order_stock::BACKORDER_LINE);
        assert_eq!(backorders.len(), 1);
        assert_eq!(backorders[0]["line_no"], 1);

        // Once backordered, redelivery does not try the stock again.
        runner.handle(&line_added(order_id, 50)).unwrap();
        assert_eq!(executor.commands(order_stock::RECORD_MOVEMENT).len(), 1);
    }
}
