//! Event plumbing shared by the domain crates and infra: the `Event` trait,
//! stream envelopes, the pub/sub bus, the saga contract and `execute`.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod saga;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use saga::{Saga, SagaAction};
