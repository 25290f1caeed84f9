//! Orders, their nested items and delivery.
//!
//! Line changes only record order events; the order/stock saga moves the stock.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::Utc;

use woodhop_core::AggregateId;
use woodhop_infra::aggregate_types;
use woodhop_products::ProductId;
use woodhop_sales::{
    AddLine, AssignDelivery, CancelOrder, Order, OrderCommand, OrderId, PlaceOrder, RemoveLine,
    UpdateDeliveryStatus, UpdateOrderStatus, UpdatePaymentStatus,
};

use crate::app::dto;
use crate::app::errors;
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

type ApiResult<T> = Result<T, axum::response::Response>;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(place_order))
        .route("/:id", get(get_order).delete(cancel_order))
        .route("/:id/items", get(list_items).post(add_item))
        .route("/:id/items/:line_no", delete(remove_item))
        .route("/:id/payment_status", post(update_payment_status))
        .route("/:id/status", post(update_status))
        .route("/:id/delivery", post(assign_delivery))
        .route("/:id/delivery_status", post(update_delivery_status))
}

fn order_id(raw: &str) -> ApiResult<OrderId> {
    errors::parse_id(raw, "order").map(OrderId::new)
}

/// Load the order from its stream and check the caller owns it (or is an admin).
fn owned_order(services: &AppServices, principal: &PrincipalContext, order_id: OrderId) -> ApiResult<Order> {
    let order = services
        .load(order_id.0, |id| Order::empty(OrderId::new(id)))
        .map_err(errors::dispatch_error_to_response)?;
    match order.customer_id() {
        Some(owner) => {
            authz::authorize_account(principal, owner).map_err(errors::authz_error_to_response)?;
            Ok(order)
        }
        None => Err(errors::not_found("order")),
    }
}

fn dispatch_order(services: &AppServices, order_id: OrderId, cmd: OrderCommand) -> ApiResult<usize> {
    services
        .dispatch::<Order>(order_id.0, aggregate_types::ORDER, cmd, |id| Order::empty(OrderId::new(id)))
        .map(|committed| committed.len())
        .map_err(errors::dispatch_error_to_response)
}

fn committed(order_id: OrderId, events: usize) -> axum::response::Response {
    Json(serde_json::json!({
        "id": order_id.to_string(),
        "events_committed": events,
    }))
    .into_response()
}

/// A line priced from the catalog, with the product's vendor snapshotted.
fn priced_line(services: &AppServices, order_id: OrderId, item: &dto::OrderItemRequest) -> ApiResult<OrderCommand> {
    let product_id = errors::parse_id(&item.product_id, "product").map(ProductId::new)?;
    let product = services.catalog.get(&product_id).ok_or_else(|| errors::not_found("product"))?;
    Ok(OrderCommand::AddLine(AddLine {
        order_id,
        product_id,
        vendor_id: product.vendor,
        quantity: item.quantity,
        unit_price: product.price,
        occurred_at: Utc::now(),
    }))
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    let orders = if principal.is_admin() {
        services.orders.list()
    } else {
        services.orders.for_customer(principal.customer_id())
    };
    Json(orders)
}

pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::PlaceOrderRequest>,
) -> axum::response::Response {
    let order_id = OrderId::new(AggregateId::new());
    let lines = match body
        .items
        .iter()
        .map(|item| priced_line(&services, order_id, item))
        .collect::<ApiResult<Vec<_>>>()
    {
        Ok(l) => l,
        Err(resp) => return resp,
    };

    let place = OrderCommand::PlaceOrder(PlaceOrder {
        order_id,
        customer_id: principal.customer_id(),
        delivery_option: body.delivery_option,
        description: body.description,
        occurred_at: Utc::now(),
    });
    let place = match CmdAuth::new(place, authz::ORDERS_PLACE).authorize(&principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let mut events = 0;
    for cmd in std::iter::once(place).chain(lines) {
        match dispatch_order(&services, order_id, cmd) {
            Ok(n) => events += n,
            Err(resp) => return resp,
        }
    }

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": order_id.to_string(),
            "events_committed": events,
        })),
    )
        .into_response()
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match order_id(&id) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    let Some(order) = services.orders.get(&order_id) else {
        return errors::not_found("order");
    };
    match authz::authorize_account(&principal, order.customer_id) {
        Ok(()) => Json(order).into_response(),
        Err(e) => errors::authz_error_to_response(e),
    }
}

/// Deleting an order cancels it; the saga returns any deducted stock.
pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match order_id(&id) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    if let Err(resp) = owned_order(&services, &principal, order_id) {
        return resp;
    }

    let cmd = OrderCommand::CancelOrder(CancelOrder {
        order_id,
        occurred_at: Utc::now(),
    });
    match dispatch_order(&services, order_id, cmd) {
        Ok(n) => {
            tracing::info!(order_id = %order_id, "order cancelled");
            committed(order_id, n)
        }
        Err(resp) => resp,
    }
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match order_id(&id) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    match owned_order(&services, &principal, order_id) {
        Ok(order) => Json(order.lines()).into_response(),
        Err(resp) => resp,
    }
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::OrderItemRequest>,
) -> axum::response::Response {
    let order_id = match order_id(&id) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    let cmd = owned_order(&services, &principal, order_id).and_then(|_| priced_line(&services, order_id, &body));
    match cmd.and_then(|cmd| dispatch_order(&services, order_id, cmd)) {
        Ok(n) => (StatusCode::CREATED, committed(order_id, n)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn remove_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
) -> axum::response::Response {
    let order_id = match order_id(&id) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    if let Err(resp) = owned_order(&services, &principal, order_id) {
        return resp;
    }

    let cmd = OrderCommand::RemoveLine(RemoveLine {
        order_id,
        line_no,
        occurred_at: Utc::now(),
    });
    match dispatch_order(&services, order_id, cmd) {
        Ok(n) => committed(order_id, n),
        Err(resp) => resp,
    }
}

/// Back-office command on any order, gated by a permission instead of ownership.
fn manage_order(
    services: &AppServices,
    principal: &PrincipalContext,
    order_id: OrderId,
    permission: &'static str,
    cmd: OrderCommand,
) -> axum::response::Response {
    let cmd = match CmdAuth::new(cmd, permission).authorize(principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match dispatch_order(services, order_id, cmd) {
        Ok(n) => committed(order_id, n),
        Err(resp) => resp,
    }
}

pub async fn update_payment_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PaymentStatusRequest>,
) -> axum::response::Response {
    let order_id = match order_id(&id) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    let cmd = OrderCommand::UpdatePaymentStatus(UpdatePaymentStatus {
        order_id,
        status: body.status,
        occurred_at: Utc::now(),
    });
    manage_order(&services, &principal, order_id, authz::ORDERS_MANAGE, cmd)
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::OrderStatusRequest>,
) -> axum::response::Response {
    let order_id = match order_id(&id) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    let cmd = OrderCommand::UpdateOrderStatus(UpdateOrderStatus {
        order_id,
        status: body.status,
        occurred_at: Utc::now(),
    });
    manage_order(&services, &principal, order_id, authz::ORDERS_MANAGE, cmd)
}

pub async fn assign_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignDeliveryRequest>,
) -> axum::response::Response {
    let order_id = match order_id(&id) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    let transport_cost = match dto::parse_money(&body.transport_cost, "transport_cost") {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let cmd = OrderCommand::AssignDelivery(AssignDelivery {
        order_id,
        delivery_date: body.delivery_date,
        address: body.address,
        driver_name: body.driver_name,
        transport_cost,
        occurred_at: Utc::now(),
    });
    manage_order(&services, &principal, order_id, authz::DELIVERIES_MANAGE, cmd)
}

pub async fn update_delivery_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DeliveryStatusRequest>,
) -> axum::response::Response {
    let order_id = match order_id(&id) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    let cmd = OrderCommand::UpdateDeliveryStatus(UpdateDeliveryStatus {
        order_id,
        status: body.status,
        occurred_at: Utc::now(),
    });
    manage_order(&services, &principal, order_id, authz::DELIVERIES_MANAGE, cmd)
}
