//! Aggregate traits for the event-sourced storefront models.

use crate::error::{DomainError, DomainResult};

/// Identity and revision of a consistency boundary (product, order, stock item...).
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far; equals the stream revision after rehydration.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an append.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (saga bookkeeping streams, imports).
    Any,
    /// Require the stream to be at an exact revision.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

/// Decide/evolve contract for event-sourced aggregates.
///
/// - `handle(&self, cmd)` inspects state and returns the events a command produces.
///   It never mutates; an empty vector means "nothing to do" (e.g. a replayed movement).
/// - `apply(&mut self, event)` folds one event into state and bumps the version.
///
/// Neither method performs IO.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Fold a full history into a fresh instance.
    fn rehydrate<'a>(mut self, history: impl IntoIterator<Item = &'a Self::Event>) -> Self
    where
        Self: Sized,
        Self::Event: 'a,
    {
        for event in history {
            self.apply(event);
        }
        self
    }
}
