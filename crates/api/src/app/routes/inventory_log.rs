use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::get,
};

use woodhop_products::ProductId;

use crate::app::dto;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_movements))
        .route("/:product_id/:movement_no", get(get_movement))
}

/// Movement journal, optionally for one product.
pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::MovementLogQuery>,
) -> axum::response::Response {
    let product_id = match query.product_id.as_deref().map(|raw| errors::parse_id(raw, "product")).transpose() {
        Ok(p) => p.map(ProductId::new),
        Err(resp) => return resp,
    };
    Json(services.inventory.journal(product_id)).into_response()
}

pub async fn get_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Path((product_id, movement_no)): Path<(String, u64)>,
) -> axum::response::Response {
    let product_id = match errors::parse_id(&product_id, "product") {
        Ok(agg) => ProductId::new(agg),
        Err(resp) => return resp,
    };
    match services.inventory.movement(product_id, movement_no) {
        Some(view) => Json(view).into_response(),
        None => errors::not_found("movement"),
    }
}
