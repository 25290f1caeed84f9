//! Session cart and checkout.
//!
//! Carts are keyed by the `x-cart-session` header. The first `add` without a
//! session creates one and returns its id in the same header.

use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use woodhop_core::AggregateId;
use woodhop_infra::aggregate_types;
use woodhop_products::ProductId;
use woodhop_sales::{AddLine, CartLine, Order, OrderCommand, OrderId, PlaceOrder};

use crate::app::dto::{self, CartView};
use crate::app::errors;
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub const CART_SESSION_HEADER: &str = "x-cart-session";

fn session_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CART_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn with_session(session: &str, body: serde_json::Value, status: StatusCode) -> axum::response::Response {
    let mut resp = (status, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(session) {
        resp.headers_mut().insert(CART_SESSION_HEADER, value);
    }
    resp
}

pub async fn view_cart(Extension(services): Extension<Arc<AppServices>>, headers: HeaderMap) -> impl IntoResponse {
    let cart = session_of(&headers).map(|s| services.carts.get(&s)).unwrap_or_default();
    Json(CartView::from(&cart))
}

pub async fn cart_count(Extension(services): Extension<Arc<AppServices>>, headers: HeaderMap) -> impl IntoResponse {
    let count = session_of(&headers).map(|s| services.carts.get(&s).count()).unwrap_or(0);
    Json(serde_json::json!({ "count": count }))
}

pub async fn add_to_cart(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::CartAddRequest>,
) -> axum::response::Response {
    let product_id = match errors::parse_id(&body.product_id, "product") {
        Ok(agg) => ProductId::new(agg),
        Err(resp) => return resp,
    };
    let Some(product) = services.catalog.get(&product_id) else {
        return errors::not_found("product");
    };

    let session = session_of(&headers).unwrap_or_else(|| Uuid::now_v7().to_string());
    let line = CartLine {
        product_id,
        name: product.name,
        unit_price: product.price,
        quantity: body.quantity.unwrap_or(1),
        product_type: product.product_type,
    };

    let added = services.carts.update(&session, |cart| cart.add(line).map(|()| CartView::from(&*cart)));
    match added {
        Ok(view) => with_session(
            &session,
            serde_json::json!({ "session": session, "cart": view }),
            StatusCode::OK,
        ),
        Err(e) => errors::json_error(StatusCode::BAD_REQUEST, "invalid_quantity", e.to_string()),
    }
}

pub async fn remove_from_cart(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::CartRemoveRequest>,
) -> axum::response::Response {
    let product_id = match errors::parse_id(&body.product_id, "product") {
        Ok(agg) => ProductId::new(agg),
        Err(resp) => return resp,
    };
    let Some(session) = session_of(&headers) else {
        return errors::json_error(StatusCode::BAD_REQUEST, "no_cart", "missing cart session");
    };

    let (removed, view) = services.carts.update(&session, |cart| (cart.remove(product_id), CartView::from(&*cart)));
    with_session(
        &session,
        serde_json::json!({ "removed": removed, "cart": view }),
        StatusCode::OK,
    )
}

/// Turn the session cart into an order: one `PlaceOrder`, then an `AddLine`
/// per cart line with the cart's price snapshot. Stock moves once the lines
/// reach the order/stock saga.
pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    headers: HeaderMap,
    body: Option<Json<dto::CheckoutRequest>>,
) -> axum::response::Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let Some(session) = session_of(&headers) else {
        return errors::json_error(StatusCode::BAD_REQUEST, "no_cart", "missing cart session");
    };
    let cart = services.carts.get(&session);
    if cart.is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "cart_empty", "cart is empty");
    }

    let order_id = OrderId::new(AggregateId::new());
    let place = OrderCommand::PlaceOrder(PlaceOrder {
        order_id,
        customer_id: principal.customer_id(),
        delivery_option: body.delivery_option,
        description: body.description,
        occurred_at: Utc::now(),
    });
    let place = match CmdAuth::new(place, authz::ORDERS_PLACE).authorize(&principal) {
        Ok(cmd) => cmd,
        Err(resp) => return resp,
    };

    let dispatch = |cmd| services.dispatch::<Order>(order_id.0, aggregate_types::ORDER, cmd, |id| Order::empty(OrderId::new(id)));
    if let Err(e) = dispatch(place) {
        return errors::dispatch_error_to_response(e);
    }
    for line in cart.lines() {
        let vendor_id = services.catalog.get(&line.product_id).and_then(|p| p.vendor);
        let add = OrderCommand::AddLine(AddLine {
            order_id,
            product_id: line.product_id,
            vendor_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            occurred_at: Utc::now(),
        });
        if let Err(e) = dispatch(add) {
            return errors::dispatch_error_to_response(e);
        }
    }

    services.carts.take(&session);
    tracing::info!(order_id = %order_id, customer_id = %principal.customer_id(), lines = cart.lines().len(), "checkout completed");

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "order_id": order_id.to_string(),
            "total": cart.total(),
            "items": cart.count(),
        })),
    )
        .into_response()
}
