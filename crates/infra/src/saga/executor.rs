use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use woodhop_events::{EventBus, EventEnvelope};
use woodhop_inventory::{InventoryCommand, InventoryItem, InventoryItemId, RecordMovement};
use woodhop_sales::{BackorderLine, Order, OrderCommand};

use crate::aggregate_types;
use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;

use super::order_stock::{BACKORDER_LINE, RECORD_MOVEMENT};
use super::{CommandExecutor, SagaError};

/// Routes JSON saga commands to the inventory and order aggregates.
pub struct DispatchingExecutor<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> DispatchingExecutor<S, B> {
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }
}

fn payload<T: DeserializeOwned>(payload: &JsonValue) -> Result<T, SagaError> {
    serde_json::from_value(payload.clone()).map_err(|e| SagaError::InvalidPayload(e.to_string()))
}

impl<S, B> CommandExecutor for DispatchingExecutor<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>> + Send + Sync,
{
    type Error = SagaError;

    fn execute(&self, aggregate_type: &str, command_type: &str, body: &JsonValue) -> Result<(), Self::Error> {
        match (aggregate_type, command_type) {
            (aggregate_types::INVENTORY_ITEM, RECORD_MOVEMENT) => {
                let cmd: RecordMovement = payload(body)?;
                let item_id = InventoryItemId::for_product(cmd.product_id);
                self.dispatcher.dispatch(
                    item_id.0,
                    aggregate_types::INVENTORY_ITEM,
                    InventoryCommand::RecordMovement(cmd),
                    |id| InventoryItem::empty(InventoryItemId::new(id)),
                )?;
                Ok(())
            }
            (aggregate_types::ORDER, BACKORDER_LINE) => {
                let cmd: BackorderLine = payload(body)?;
                self.dispatcher.dispatch(
                    cmd.order_id.0,
                    aggregate_types::ORDER,
                    OrderCommand::BackorderLine(cmd),
                    |id| Order::empty(woodhop_sales::OrderId::new(id)),
                )?;
                Ok(())
            }
            _ => Err(SagaError::UnknownCommand {
                aggregate_type: aggregate_type.to_string(),
                command_type: command_type.to_string(),
            }),
        }
    }

    fn is_rejection(&self, error: &Self::Error) -> bool {
        error.is_rejection()
    }
}
