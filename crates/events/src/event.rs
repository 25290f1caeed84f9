use chrono::{DateTime, Utc};

/// A fact recorded in an aggregate stream.
///
/// Events are immutable, versioned and append-only. `event_type` names follow
/// `<context>.<aggregate>.<fact>`, e.g. `"inventory.item.stock_moved"`.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;
}
