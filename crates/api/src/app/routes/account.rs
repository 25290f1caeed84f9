//! Signed-in storefront pages: dashboards, order history, bulk ordering and
//! the vendor's product and staff forms.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use woodhop_core::{AggregateId, CustomerId};
use woodhop_infra::aggregate_types;
use woodhop_infra::dashboards::{self, Dashboard};
use woodhop_infra::projections::{CustomerView, InventoryView};
use woodhop_parties::{AddStaff, Customer, CustomerCommand, CustomerType, StaffId};
use woodhop_products::{CreateProduct, Product, ProductCommand, ProductId};
use woodhop_sales::OrderId;

use crate::app::dto;
use crate::app::errors;
use crate::app::routes::common::{self, CmdAuth, NewStockItem};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/orders", get(my_orders))
        .route("/order/:id", get(my_order))
        .route("/bulk-order", get(bulk_order))
        .route("/business/products", post(create_business_product))
        .route("/business/staff", post(add_staff))
}

fn own_account(services: &AppServices, principal: &PrincipalContext) -> Result<CustomerView, axum::response::Response> {
    services
        .customers
        .get(&principal.customer_id())
        .ok_or_else(|| errors::not_found("customer account"))
}

fn business_account(services: &AppServices, principal: &PrincipalContext) -> Result<CustomerView, axum::response::Response> {
    let customer = own_account(services, principal)?;
    if customer.customer_type.is_vendor() {
        Ok(customer)
    } else {
        Err(errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "only business accounts can manage products and staff",
        ))
    }
}

/// The dashboard matching the caller's customer type.
pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let customer = match own_account(&services, &principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let own_orders = services.orders.for_customer(customer.customer_id);

    let view = match customer.customer_type {
        CustomerType::Business => {
            let products = services.catalog.by_vendor(customer.customer_id);
            let inventory: Vec<InventoryView> = products
                .iter()
                .filter_map(|p| services.inventory.get(&p.product_id))
                .collect();
            let sales = services.orders.for_vendor(customer.customer_id);
            Dashboard::Business(dashboards::business_dashboard(&customer, &products, &inventory, &sales, Utc::now()))
        }
        CustomerType::Contractor => Dashboard::Contractor(dashboards::contractor_dashboard(&customer, &own_orders)),
        CustomerType::Retailer => Dashboard::Retailer(dashboards::retailer_dashboard(&customer, &own_orders)),
        CustomerType::Individual => Dashboard::Individual(dashboards::individual_dashboard(&customer, &own_orders)),
    };
    Json(view).into_response()
}

pub async fn my_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    let mut orders = services.orders.for_customer(principal.customer_id());
    orders.sort_by(|a, b| b.order_date.cmp(&a.order_date));
    Json(serde_json::json!({ "orders": orders }))
}

pub async fn my_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match errors::parse_id(&id, "order") {
        Ok(agg) => OrderId::new(agg),
        Err(resp) => return resp,
    };
    // Someone else's order reads as missing.
    match services.orders.get(&order_id) {
        Some(order) if order.customer_id == principal.customer_id() => Json(order).into_response(),
        _ => errors::not_found("order"),
    }
}

pub async fn bulk_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let customer = match own_account(&services, &principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(offer) = dashboards::bulk_order_offer(customer.customer_type) else {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "bulk ordering is available to business, contractor and retailer accounts",
        );
    };

    Json(serde_json::json!({
        "customer": customer,
        "offer": offer,
        "products": services.catalog.list(),
        "categories": services.catalog.categories(),
    }))
    .into_response()
}

/// Business form: the product and its stock item in one step.
pub async fn create_business_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    let vendor = match business_account(&services, &principal) {
        Ok(c) => c.customer_id,
        Err(resp) => return resp,
    };
    create_product_with_stock(&services, &principal, body, Some(vendor))
}

/// Shared by the business form and `POST /api/products`.
pub fn create_product_with_stock(
    services: &AppServices,
    principal: &PrincipalContext,
    body: dto::CreateProductRequest,
    vendor: Option<CustomerId>,
) -> axum::response::Response {
    let price = match dto::parse_money(&body.price, "price") {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let uom = match dto::parse_uom(body.uom.as_deref()) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let product_id = ProductId::new(AggregateId::new());
    let cmd = ProductCommand::CreateProduct(CreateProduct {
        product_id,
        name: body.name,
        price,
        grade: body.grade,
        product_type: body.product_type,
        category: body.category,
        dimensions: body.dimensions,
        description: body.description,
        vendor,
        occurred_at: Utc::now(),
    });
    let cmd = match CmdAuth::new(cmd, authz::CATALOG_WRITE).authorize(principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    if let Err(e) = services.dispatch::<Product>(product_id.0, aggregate_types::PRODUCT, cmd, |id| {
        Product::empty(ProductId::new(id))
    }) {
        return errors::dispatch_error_to_response(e);
    }

    let stock = NewStockItem {
        initial_quantity: body.initial_quantity,
        reorder_level: body.reorder_level,
        reorder_quantity: body.reorder_quantity,
        uom,
        warehouse_location: body.warehouse_location,
    };
    if let Err(e) = common::create_stock_item(services, principal, product_id, stock) {
        return errors::dispatch_error_to_response(e);
    }
    tracing::info!(product_id = %product_id, vendor = ?vendor, "product created");

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": product_id.to_string() })),
    )
        .into_response()
}

pub async fn add_staff(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::AddStaffRequest>,
) -> axum::response::Response {
    let vendor = match business_account(&services, &principal) {
        Ok(c) => c.customer_id,
        Err(resp) => return resp,
    };

    let staff_id = StaffId::new(AggregateId::new());
    let cmd = CustomerCommand::AddStaff(AddStaff {
        customer_id: vendor,
        staff_id,
        fullname: body.fullname,
        role: body.role,
        email: body.email,
        phone: body.phone,
        occurred_at: Utc::now(),
    });
    let cmd = match CmdAuth::new(cmd, authz::STAFF_WRITE).authorize(&principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services.dispatch::<Customer>(vendor.as_aggregate_id(), aggregate_types::CUSTOMER, cmd, |id| {
        Customer::empty(CustomerId::from(id))
    }) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "staff_id": staff_id.0.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
