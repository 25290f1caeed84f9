//! Catalog domain module (event-sourced).
//!
//! Products sold in the shop: wood species, grades and dimensions, priced per
//! unit and optionally owned by a vendor (a Business customer). Stock counters
//! live in `woodhop-inventory`, keyed by the same id.

pub mod product;

pub use product::{
    CreateProduct, DEFAULT_GRADE, Product, ProductCommand, ProductCreated, ProductEvent, ProductId,
    ProductRemoved, ProductStatus, ProductUpdated, RemoveProduct, UpdateProduct,
};
