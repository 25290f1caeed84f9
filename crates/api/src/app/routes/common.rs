use chrono::Utc;
use woodhop_auth::{CommandAuthorization, Permission};
use woodhop_core::AggregateId;
use woodhop_inventory::{CreateItem, InventoryCommand, InventoryItem, InventoryItemId, UnitOfMeasure};
use woodhop_infra::aggregate_types;
use woodhop_infra::command_dispatcher::DispatchError;
use woodhop_products::ProductId;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Small helper wrapper to associate required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, required: &'static str) -> Self {
        Self {
            inner,
            required: vec![Permission::new(required)],
        }
    }

    /// Check the caller's permissions, handing back the command on success.
    pub fn authorize(self, principal: &PrincipalContext) -> Result<C, axum::response::Response> {
        crate::authz::authorize_command(principal, &self).map_err(errors::authz_error_to_response)?;
        Ok(self.inner)
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Permission check for reads and guards that carry no command.
pub fn require(principal: &PrincipalContext, permission: &'static str) -> Result<(), axum::response::Response> {
    woodhop_auth::authorize(&principal.principal(), &Permission::new(permission)).map_err(errors::authz_error_to_response)
}

pub struct NewStockItem {
    pub initial_quantity: u64,
    pub reorder_level: Option<u64>,
    pub reorder_quantity: Option<u64>,
    pub uom: Option<UnitOfMeasure>,
    pub warehouse_location: Option<String>,
}

/// Open the stock item of a catalog product.
pub fn create_stock_item(
    services: &AppServices,
    principal: &PrincipalContext,
    product_id: ProductId,
    item: NewStockItem,
) -> Result<(), DispatchError> {
    let item_id = InventoryItemId::for_product(product_id);
    services.dispatch::<InventoryItem>(
        item_id.0,
        aggregate_types::INVENTORY_ITEM,
        InventoryCommand::CreateItem(CreateItem {
            product_id,
            initial_quantity: item.initial_quantity,
            uom: item.uom,
            reorder_level: item.reorder_level,
            reorder_quantity: item.reorder_quantity,
            warehouse_location: item.warehouse_location,
            updated_by: (!principal.is_admin()).then(|| principal.customer_id()),
            occurred_at: Utc::now(),
        }),
        |id: AggregateId| InventoryItem::empty(InventoryItemId::new(id)),
    )?;
    Ok(())
}
