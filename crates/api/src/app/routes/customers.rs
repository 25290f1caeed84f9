use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use woodhop_core::CustomerId;
use woodhop_infra::aggregate_types;
use woodhop_parties::{Customer, CustomerCommand, UpdateProfile};

use crate::app::dto;
use crate::app::errors;
use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_customers))
        .route("/:id", get(get_customer).patch(update_customer))
}

fn customer_id(raw: &str) -> Result<CustomerId, axum::response::Response> {
    errors::parse_id(raw, "customer").map(CustomerId::from)
}

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match common::require(&principal, authz::DIRECTORY_READ) {
        Ok(()) => Json(services.customers.list()).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let customer_id = match customer_id(&id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(e) = authz::authorize_account(&principal, customer_id) {
        return errors::authz_error_to_response(e);
    }
    match services.customers.get(&customer_id) {
        Some(view) => Json(view).into_response(),
        None => errors::not_found("customer"),
    }
}

pub async fn update_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateCustomerRequest>,
) -> axum::response::Response {
    let customer_id = match customer_id(&id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(e) = authz::authorize_account(&principal, customer_id) {
        return errors::authz_error_to_response(e);
    }
    let customer_type = match body.customer_type.as_deref().map(dto::parse_customer_type).transpose() {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let cmd = CustomerCommand::UpdateProfile(UpdateProfile {
        customer_id,
        fullname: body.fullname,
        location: body.location,
        customer_type,
        occurred_at: Utc::now(),
    });
    match services.dispatch::<Customer>(customer_id.as_aggregate_id(), aggregate_types::CUSTOMER, cmd, |id| {
        Customer::empty(CustomerId::from(id))
    }) {
        Ok(committed) => Json(serde_json::json!({
            "id": customer_id.to_string(),
            "events_committed": committed.len(),
        }))
        .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
