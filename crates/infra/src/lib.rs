//! Infrastructure layer: event storage, command dispatch, read models,
//! the order/stock saga and the workers that keep them in sync.

pub mod aggregate_types;
pub mod command_dispatcher;
pub mod dashboards;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod saga;
pub mod workers;

mod integration_tests;
