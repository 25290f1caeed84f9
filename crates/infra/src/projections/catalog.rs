//! Catalog read model: listed products and the storefront queries over them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use woodhop_core::{CustomerId, Money};
use woodhop_events::EventEnvelope;
use woodhop_products::{ProductEvent, ProductId};

use super::cursor::{ProjectionError, StreamCursors, decode};
use super::Projection;
use crate::aggregate_types;
use crate::read_model::ReadStore;

pub const FEATURED_COUNT: usize = 6;
pub const RELATED_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductView {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub grade: String,
    pub product_type: String,
    pub category: String,
    pub dimensions: String,
    pub description: String,
    pub vendor: Option<CustomerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters of the shop page. Both match case-insensitively on substrings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShopFilter {
    /// Matches `product_type`.
    pub product_type: Option<String>,
    /// Matches name, product type or category.
    pub search: Option<String>,
}

fn icontains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl ShopFilter {
    fn matches(&self, p: &ProductView) -> bool {
        let type_ok = match self.product_type.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => icontains(&p.product_type, t),
            _ => true,
        };
        let search_ok = match self.search.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                icontains(&p.name, q) || icontains(&p.product_type, q) || icontains(&p.category, q)
            }
            _ => true,
        };
        type_ok && search_ok
    }
}

#[derive(Debug)]
pub struct CatalogProjection<S>
where
    S: ReadStore<ProductId, ProductView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> CatalogProjection<S>
where
    S: ReadStore<ProductId, ProductView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<ProductView> {
        self.store.get(product_id)
    }

    /// Listed products, oldest first.
    pub fn list(&self) -> Vec<ProductView> {
        let mut all = self.store.list();
        all.sort_by(|a, b| (a.created_at, a.product_id).cmp(&(b.created_at, b.product_id)));
        all
    }

    pub fn featured(&self) -> Vec<ProductView> {
        self.list().into_iter().take(FEATURED_COUNT).collect()
    }

    pub fn search(&self, filter: &ShopFilter) -> Vec<ProductView> {
        self.list().into_iter().filter(|p| filter.matches(p)).collect()
    }

    /// Distinct product types, sorted.
    pub fn product_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.store.list().into_iter().map(|p| p.product_type).collect();
        types.sort();
        types.dedup();
        types
    }

    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self.store.list().into_iter().map(|p| p.category).collect();
        categories.sort();
        categories.dedup();
        categories
    }

    /// Up to four other products of the same category.
    pub fn related(&self, product: &ProductView) -> Vec<ProductView> {
        self.list()
            .into_iter()
            .filter(|p| p.category == product.category && p.product_id != product.product_id)
            .take(RELATED_COUNT)
            .collect()
    }

    pub fn by_vendor(&self, vendor: CustomerId) -> Vec<ProductView> {
        self.list()
            .into_iter()
            .filter(|p| p.vendor == Some(vendor))
            .collect()
    }

    fn apply_event(&self, event: ProductEvent, at: DateTime<Utc>) -> Result<(), ProjectionError> {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.store.upsert(
                    e.product_id,
                    ProductView {
                        product_id: e.product_id,
                        name: e.name,
                        price: e.price,
                        grade: e.grade,
                        product_type: e.product_type,
                        category: e.category,
                        dimensions: e.dimensions,
                        description: e.description,
                        vendor: e.vendor,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            ProductEvent::ProductUpdated(e) => {
                let Some(mut view) = self.store.get(&e.product_id) else {
                    return Ok(());
                };
                if let Some(v) = e.name {
                    view.name = v;
                }
                if let Some(v) = e.price {
                    view.price = v;
                }
                if let Some(v) = e.grade {
                    view.grade = v;
                }
                if let Some(v) = e.product_type {
                    view.product_type = v;
                }
                if let Some(v) = e.category {
                    view.category = v;
                }
                if let Some(v) = e.dimensions {
                    view.dimensions = v;
                }
                if let Some(v) = e.description {
                    view.description = v;
                }
                view.updated_at = at;
                self.store.upsert(e.product_id, view);
            }
            ProductEvent::ProductRemoved(e) => {
                self.store.remove(&e.product_id);
            }
        }
        Ok(())
    }
}

impl<S> Projection for CatalogProjection<S>
where
    S: ReadStore<ProductId, ProductView>,
{
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::PRODUCT {
            return Ok(());
        }

        self.cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number(), || {
                let event: ProductEvent = decode(envelope)?;
                if event.product_id().0 != envelope.aggregate_id() {
                    return Err(ProjectionError::StreamMismatch(
                        "product_id does not match envelope aggregate_id".to_string(),
                    ));
                }
                self.apply_event(event, envelope.occurred_at())
            })
    }

    fn reset(&self) {
        self.cursors.clear();
        self.store.clear();
    }
}
