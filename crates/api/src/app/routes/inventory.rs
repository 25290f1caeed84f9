use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use woodhop_infra::aggregate_types;
use woodhop_inventory::{ConfigureItem, InventoryCommand, InventoryItem, InventoryItemId, RecordMovement, StockAction};
use woodhop_products::{Product, ProductId};

use crate::app::dto;
use crate::app::errors;
use crate::app::routes::common::{self, NewStockItem};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_inventory).post(create_item))
        .route("/:product_id", get(get_item).patch(configure_item))
        .route("/:product_id/movements", post(record_movement))
}

/// Stock of a product may be changed by its vendor or an admin.
fn authorize_stock(
    services: &AppServices,
    principal: &PrincipalContext,
    product_id: ProductId,
) -> Result<(), axum::response::Response> {
    common::require(principal, authz::INVENTORY_WRITE)?;
    let product = services
        .load(product_id.0, |id| Product::empty(ProductId::new(id)))
        .map_err(errors::dispatch_error_to_response)?;
    if !product.is_created() {
        return Err(errors::not_found("product"));
    }
    authz::authorize_vendor(principal, product.vendor()).map_err(errors::authz_error_to_response)
}

fn dispatch_item(services: &AppServices, product_id: ProductId, cmd: InventoryCommand) -> axum::response::Response {
    let item_id = InventoryItemId::for_product(product_id);
    match services.dispatch::<InventoryItem>(item_id.0, aggregate_types::INVENTORY_ITEM, cmd, |id| {
        InventoryItem::empty(InventoryItemId::new(id))
    }) {
        Ok(committed) => Json(serde_json::json!({
            "product_id": product_id.to_string(),
            "events_committed": committed.len(),
        }))
        .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::InventoryQuery>,
) -> impl IntoResponse {
    if query.low_stock {
        Json(services.inventory.low_stock())
    } else {
        Json(services.inventory.list())
    }
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateInventoryRequest>,
) -> axum::response::Response {
    let product_id = match errors::parse_id(&body.product_id, "product") {
        Ok(agg) => ProductId::new(agg),
        Err(resp) => return resp,
    };
    if let Err(resp) = authorize_stock(&services, &principal, product_id) {
        return resp;
    }
    let uom = match dto::parse_uom(body.uom.as_deref()) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let item = NewStockItem {
        initial_quantity: body.initial_quantity,
        reorder_level: body.reorder_level,
        reorder_quantity: body.reorder_quantity,
        uom,
        warehouse_location: body.warehouse_location,
    };
    match common::create_stock_item(&services, &principal, product_id, item) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "product_id": product_id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> axum::response::Response {
    let product_id = match errors::parse_id(&product_id, "product") {
        Ok(agg) => ProductId::new(agg),
        Err(resp) => return resp,
    };
    match services.inventory.get(&product_id) {
        Some(view) => Json(view).into_response(),
        None => errors::not_found("inventory item"),
    }
}

pub async fn configure_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::ConfigureInventoryRequest>,
) -> axum::response::Response {
    let product_id = match errors::parse_id(&product_id, "product") {
        Ok(agg) => ProductId::new(agg),
        Err(resp) => return resp,
    };
    if let Err(resp) = authorize_stock(&services, &principal, product_id) {
        return resp;
    }
    let uom = match dto::parse_uom(body.uom.as_deref()) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let cmd = InventoryCommand::ConfigureItem(ConfigureItem {
        product_id,
        reorder_level: body.reorder_level,
        reorder_quantity: body.reorder_quantity,
        uom,
        warehouse_location: body.warehouse_location,
        occurred_at: Utc::now(),
    });
    dispatch_item(&services, product_id, cmd)
}

/// Manual journal entry (restock, damage write-off, reservation).
pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::MovementRequest>,
) -> axum::response::Response {
    let product_id = match errors::parse_id(&product_id, "product") {
        Ok(agg) => ProductId::new(agg),
        Err(resp) => return resp,
    };
    let action: StockAction = match body.action.parse() {
        Ok(a) => a,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_action", format!("{e}")),
    };
    if let Err(resp) = authorize_stock(&services, &principal, product_id) {
        return resp;
    }

    let cmd = InventoryCommand::RecordMovement(RecordMovement {
        product_id,
        action,
        quantity: body.quantity,
        note: body.note,
        updated_by: (!principal.is_admin()).then(|| principal.customer_id()),
        reference: body.reference,
        occurred_at: Utc::now(),
    });
    let resp = dispatch_item(&services, product_id, cmd);
    if resp.status().is_success() {
        tracing::info!(product_id = %product_id, action = action.code(), quantity = body.quantity, "stock movement recorded");
    }
    resp
}
