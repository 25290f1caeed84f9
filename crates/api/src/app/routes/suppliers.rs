use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use woodhop_core::AggregateId;
use woodhop_infra::aggregate_types;
use woodhop_parties::{LinkProduct, RegisterSupplier, Supplier, SupplierCommand, SupplierId, UpdateSupplier};
use woodhop_products::ProductId;

use crate::app::dto;
use crate::app::errors;
use crate::app::routes::common::{self, CmdAuth};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_suppliers).post(register_supplier))
        .route("/:id", get(get_supplier).patch(update_supplier))
        .route("/:id/products", get(supplied_products).post(link_product))
}

fn supplier_id(raw: &str) -> Result<SupplierId, axum::response::Response> {
    errors::parse_id(raw, "supplier").map(SupplierId::new)
}

fn dispatch_supplier(
    services: &AppServices,
    principal: &PrincipalContext,
    supplier_id: SupplierId,
    cmd: SupplierCommand,
    status: StatusCode,
) -> axum::response::Response {
    let cmd = match CmdAuth::new(cmd, authz::SUPPLIERS_WRITE).authorize(principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match services.dispatch::<Supplier>(supplier_id.0, aggregate_types::SUPPLIER, cmd, |id| {
        Supplier::empty(SupplierId::new(id))
    }) {
        Ok(committed) => (
            status,
            Json(serde_json::json!({
                "id": supplier_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_suppliers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match common::require(&principal, authz::SUPPLIERS_WRITE) {
        Ok(()) => Json(services.suppliers.list()).into_response(),
        Err(resp) => resp,
    }
}

pub async fn register_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterSupplierRequest>,
) -> axum::response::Response {
    let supplier_id = SupplierId::new(AggregateId::new());
    let cmd = SupplierCommand::RegisterSupplier(RegisterSupplier {
        supplier_id,
        name: body.name,
        contacts: body.contacts,
        email: body.email,
        address: body.address,
        occurred_at: Utc::now(),
    });
    dispatch_supplier(&services, &principal, supplier_id, cmd, StatusCode::CREATED)
}

pub async fn get_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = common::require(&principal, authz::SUPPLIERS_WRITE) {
        return resp;
    }
    let supplier_id = match supplier_id(&id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match services.suppliers.get(&supplier_id) {
        Some(view) => Json(view).into_response(),
        None => errors::not_found("supplier"),
    }
}

pub async fn update_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateSupplierRequest>,
) -> axum::response::Response {
    let supplier_id = match supplier_id(&id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let cmd = SupplierCommand::UpdateSupplier(UpdateSupplier {
        supplier_id,
        name: body.name,
        contacts: body.contacts,
        email: body.email,
        address: body.address,
        occurred_at: Utc::now(),
    });
    dispatch_supplier(&services, &principal, supplier_id, cmd, StatusCode::OK)
}

pub async fn supplied_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = common::require(&principal, authz::SUPPLIERS_WRITE) {
        return resp;
    }
    let supplier_id = match supplier_id(&id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match services.suppliers.get(&supplier_id) {
        Some(view) => Json(view.products).into_response(),
        None => errors::not_found("supplier"),
    }
}

pub async fn link_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::LinkProductRequest>,
) -> axum::response::Response {
    let supplier_id = match supplier_id(&id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let product_id = match errors::parse_id(&body.product_id, "product") {
        Ok(agg) => ProductId::new(agg),
        Err(resp) => return resp,
    };
    if services.catalog.get(&product_id).is_none() {
        return errors::not_found("product");
    }
    let supply_price = match dto::parse_money(&body.supply_price, "supply_price") {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let cmd = SupplierCommand::LinkProduct(LinkProduct {
        supplier_id,
        product_id,
        supply_price,
        supply_date: body.supply_date,
        occurred_at: Utc::now(),
    });
    dispatch_supplier(&services, &principal, supplier_id, cmd, StatusCode::CREATED)
}
