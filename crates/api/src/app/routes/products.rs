use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use woodhop_core::CustomerId;
use woodhop_infra::aggregate_types;
use woodhop_products::{Product, ProductCommand, ProductId, RemoveProduct, UpdateProduct};

use crate::app::dto;
use crate::app::errors;
use crate::app::routes::account::create_product_with_stock;
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).patch(update_product).delete(remove_product))
        .route("/:id/inventory", get(product_inventory))
}

fn product_id(raw: &str) -> Result<ProductId, axum::response::Response> {
    errors::parse_id(raw, "product").map(ProductId::new)
}

/// Load the product and check the caller may change it (its vendor or an admin).
fn owned_product(
    services: &AppServices,
    principal: &PrincipalContext,
    product_id: ProductId,
) -> Result<Product, axum::response::Response> {
    let product = services
        .load(product_id.0, |id| Product::empty(ProductId::new(id)))
        .map_err(errors::dispatch_error_to_response)?;
    if !product.is_created() {
        return Err(errors::not_found("product"));
    }
    authz::authorize_vendor(principal, product.vendor()).map_err(errors::authz_error_to_response)?;
    Ok(product)
}

fn dispatch_product(
    services: &AppServices,
    principal: &PrincipalContext,
    product_id: ProductId,
    cmd: ProductCommand,
) -> axum::response::Response {
    let cmd = match CmdAuth::new(cmd, authz::CATALOG_WRITE).authorize(principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match services.dispatch::<Product>(product_id.0, aggregate_types::PRODUCT, cmd, |id| Product::empty(ProductId::new(id))) {
        Ok(committed) => Json(serde_json::json!({
            "id": product_id.to_string(),
            "events_committed": committed.len(),
        }))
        .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_products(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(services.catalog.list())
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    // Admins may name any vendor; vendors always sell as themselves.
    let vendor = if principal.is_admin() {
        match body.vendor.as_deref().map(|raw| errors::parse_id(raw, "vendor")).transpose() {
            Ok(v) => v.map(CustomerId::from),
            Err(resp) => return resp,
        }
    } else {
        Some(principal.customer_id())
    };
    create_product_with_stock(&services, &principal, body, vendor)
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match product_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match services.catalog.get(&product_id) {
        Some(view) => Json(view).into_response(),
        None => errors::not_found("product"),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProductRequest>,
) -> axum::response::Response {
    let product_id = match product_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    if let Err(resp) = owned_product(&services, &principal, product_id) {
        return resp;
    }
    let price = match body.price.as_deref().map(|raw| dto::parse_money(raw, "price")).transpose() {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let cmd = ProductCommand::UpdateProduct(UpdateProduct {
        name: body.name,
        price,
        grade: body.grade,
        product_type: body.product_type,
        category: body.category,
        dimensions: body.dimensions,
        description: body.description,
        ..UpdateProduct::new(product_id, Utc::now())
    });
    dispatch_product(&services, &principal, product_id, cmd)
}

pub async fn remove_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match product_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    if let Err(resp) = owned_product(&services, &principal, product_id) {
        return resp;
    }

    let cmd = ProductCommand::RemoveProduct(RemoveProduct {
        product_id,
        occurred_at: Utc::now(),
    });
    let resp = dispatch_product(&services, &principal, product_id, cmd);
    if resp.status() == StatusCode::OK {
        tracing::info!(product_id = %product_id, "product removed");
    }
    resp
}

pub async fn product_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match product_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match services.inventory.get(&product_id) {
        Some(view) => Json(view).into_response(),
        None => errors::not_found("inventory item"),
    }
}
