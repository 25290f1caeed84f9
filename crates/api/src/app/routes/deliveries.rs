use std::sync::Arc;

use axum::{Json, Router, extract::Extension, response::IntoResponse, routing::get};
use serde::Serialize;

use woodhop_sales::{Delivery, OrderId};

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

#[derive(Debug, Serialize)]
pub struct DeliveryRow {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub delivery: Delivery,
}

pub fn router() -> Router {
    Router::new().route("/", get(list_deliveries))
}

/// Every scheduled delivery, soonest first.
pub async fn list_deliveries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = common::require(&principal, authz::DELIVERIES_MANAGE) {
        return resp;
    }
    let mut rows: Vec<DeliveryRow> = services
        .orders
        .deliveries()
        .into_iter()
        .map(|(order_id, delivery)| DeliveryRow { order_id, delivery })
        .collect();
    rows.sort_by(|a, b| a.delivery.delivery_date.cmp(&b.delivery.delivery_date));
    Json(rows).into_response()
}
