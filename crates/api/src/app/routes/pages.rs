//! Storefront pages, served as JSON view-models.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    response::IntoResponse,
};

use woodhop_infra::projections::ShopFilter;
use woodhop_products::ProductId;

use crate::app::dto::{self, ProductDetailView};
use crate::app::errors;
use crate::app::services::AppServices;

pub async fn home(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "featured_products": services.catalog.featured(),
        "product_types": services.catalog.product_types(),
    }))
}

pub async fn shop(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ShopQuery>,
) -> impl IntoResponse {
    let filter = ShopFilter {
        product_type: query.product_type.filter(|t| !t.trim().is_empty()),
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let products = services.catalog.search(&filter);

    Json(serde_json::json!({
        "products": products,
        "product_types": services.catalog.product_types(),
        "categories": services.catalog.categories(),
        "selected_type": filter.product_type,
        "search_query": filter.search,
    }))
}

pub async fn product_detail(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match errors::parse_id(&id, "product") {
        Ok(agg) => ProductId::new(agg),
        Err(resp) => return resp,
    };
    let Some(product) = services.catalog.get(&product_id) else {
        return errors::not_found("product");
    };

    Json(ProductDetailView {
        inventory: services.inventory.get(&product_id),
        related_products: services.catalog.related(&product),
        product,
    })
    .into_response()
}
