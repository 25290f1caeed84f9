use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use woodhop_events::EventEnvelope;
use woodhop_parties::{SuppliedProduct, SupplierEvent, SupplierId};
use woodhop_products::ProductId;

use super::cursor::{ProjectionError, StreamCursors, decode};
use super::Projection;
use crate::aggregate_types;
use crate::read_model::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupplierView {
    pub supplier_id: SupplierId,
    pub name: String,
    pub contacts: String,
    pub email: String,
    pub address: String,
    pub products: Vec<SuppliedProduct>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SupplierDirectoryProjection<S>
where
    S: ReadStore<SupplierId, SupplierView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> SupplierDirectoryProjection<S>
where
    S: ReadStore<SupplierId, SupplierView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, supplier_id: &SupplierId) -> Option<SupplierView> {
        self.store.get(supplier_id)
    }

    pub fn list(&self) -> Vec<SupplierView> {
        let mut all = self.store.list();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.supplier_id.cmp(&b.supplier_id)));
        all
    }

    /// Suppliers that deliver `product_id`.
    pub fn for_product(&self, product_id: ProductId) -> Vec<SupplierView> {
        self.list()
            .into_iter()
            .filter(|s| s.products.iter().any(|p| p.product_id == product_id))
            .collect()
    }

    fn apply_event(&self, event: SupplierEvent) -> Result<(), ProjectionError> {
        match event {
            SupplierEvent::SupplierRegistered(e) => {
                self.store.upsert(
                    e.supplier_id,
                    SupplierView {
                        supplier_id: e.supplier_id,
                        name: e.name,
                        contacts: e.contacts,
                        email: e.email,
                        address: e.address,
                        products: vec![],
                        registered_at: e.occurred_at,
                    },
                );
            }
            SupplierEvent::SupplierUpdated(e) => {
                let mut view = self.existing(e.supplier_id)?;
                view.name = e.name;
                view.contacts = e.contacts;
                view.email = e.email;
                view.address = e.address;
                self.store.upsert(e.supplier_id, view);
            }
            SupplierEvent::ProductLinked(e) => {
                let mut view = self.existing(e.supplier_id)?;
                view.products.push(e.product);
                self.store.upsert(e.supplier_id, view);
            }
        }
        Ok(())
    }

    fn existing(&self, supplier_id: SupplierId) -> Result<SupplierView, ProjectionError> {
        self.store.get(&supplier_id).ok_or_else(|| {
            ProjectionError::StreamMismatch(format!("event for unregistered supplier {supplier_id}"))
        })
    }
}

impl<S> Projection for SupplierDirectoryProjection<S>
where
    S: ReadStore<SupplierId, SupplierView>,
{
    fn name(&self) -> &'static str {
        "suppliers"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::SUPPLIER {
            return Ok(());
        }

        self.cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number(), || {
                let event: SupplierEvent = decode(envelope)?;
                if event.supplier_id().0 != envelope.aggregate_id() {
                    return Err(ProjectionError::StreamMismatch(
                        "supplier_id does not match envelope aggregate_id".to_string(),
                    ));
                }
                self.apply_event(event)
            })
    }

    fn reset(&self) {
        self.cursors.clear();
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::test_support::envelope;
    use crate::read_model::InMemoryReadStore;
    use woodhop_core::{AggregateId, Money};
    use woodhop_parties::{ProductLinked, SupplierRegistered};

    #[test]
    fn linked_products_are_listed_per_supplier() {
        let p = SupplierDirectoryProjection::new(InMemoryReadStore::new());
        let supplier_id = SupplierId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());

        let registered = SupplierEvent::SupplierRegistered(SupplierRegistered {
            supplier_id,
            name: "Mabira Sawmills".to_string(),
            contacts: "+256 700 000000".to_string(),
            email: "sales@mabira.test".to_string(),
            address: "Mukono".to_string(),
            occurred_at: Utc::now(),
        });
        let linked = SupplierEvent::ProductLinked(ProductLinked {
            supplier_id,
            product: SuppliedProduct {
                product_id,
                supply_price: Money::from_cents(4_500),
                supply_date: Utc::now(),
            },
            occurred_at: Utc::now(),
        });

        p.apply_envelope(&envelope(aggregate_types::SUPPLIER, supplier_id.0, 1, &registered)).unwrap();
        p.apply_envelope(&envelope(aggregate_types::SUPPLIER, supplier_id.0, 2, &linked)).unwrap();
        p.apply_envelope(&envelope(aggregate_types::SUPPLIER, supplier_id.0, 2, &linked)).unwrap();

        assert_eq!(p.get(&supplier_id).unwrap().products.len(), 1);
        assert_eq!(p.for_product(product_id).len(), 1);
        assert!(p.for_product(ProductId::new(AggregateId::new())).is_empty());
    }
}
