use axum::{
    Router,
    routing::{get, post},
};

pub mod account;
pub mod auth;
pub mod cart;
pub mod common;
pub mod customers;
pub mod deliveries;
pub mod inventory;
pub mod inventory_log;
pub mod orders;
pub mod pages;
pub mod products;
pub mod suppliers;
pub mod system;

/// Storefront pages, the session cart and the login flows.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/", get(pages::home))
        .route("/shop", get(pages::shop))
        .route("/product/:id", get(pages::product_detail))
        .route("/cart", get(cart::view_cart))
        .route("/cart/add", post(cart::add_to_cart))
        .route("/cart/remove", post(cart::remove_from_cart))
        .route("/cart/count", get(cart::cart_count))
        .nest("/auth", auth::public_router())
}

/// Router for all authenticated endpoints.
pub fn protected_router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/auth/logout", post(auth::logout))
        .route("/cart/checkout", post(cart::checkout))
        .merge(account::router())
        .nest("/api", api_router())
}

fn api_router() -> Router {
    Router::new()
        .nest("/products", products::router())
        .nest("/customers", customers::router())
        .nest("/orders", orders::router())
        .nest("/inventory", inventory::router())
        .nest("/inventory-log", inventory_log::router())
        .nest("/suppliers", suppliers::router())
        .nest("/deliveries", deliveries::router())
}
