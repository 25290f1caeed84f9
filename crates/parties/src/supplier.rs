use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use woodhop_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use woodhop_events::Event;
use woodhop_products::ProductId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(pub AggregateId);

impl SupplierId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SupplierId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A product this supplier delivers, with the price agreed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppliedProduct {
    pub product_id: ProductId,
    pub supply_price: Money,
    pub supply_date: DateTime<Utc>,
}

/// Aggregate root: Supplier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supplier {
    id: SupplierId,
    name: String,
    contacts: String,
    email: String,
    address: String,
    products: Vec<SuppliedProduct>,
    version: u64,
    created: bool,
}

impl Supplier {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SupplierId) -> Self {
        Self {
            id,
            name: String::new(),
            contacts: String::new(),
            email: String::new(),
            address: String::new(),
            products: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SupplierId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contacts(&self) -> &str {
        &self.contacts
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn products(&self) -> &[SuppliedProduct] {
        &self.products
    }

    pub fn supplies(&self, product_id: ProductId) -> bool {
        self.products.iter().any(|p| p.product_id == product_id)
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSupplier {
    pub supplier_id: SupplierId,
    pub name: String,
    pub contacts: String,
    pub email: String,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateSupplier (`None` keeps the current value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSupplier {
    pub supplier_id: SupplierId,
    pub name: Option<String>,
    pub contacts: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LinkProduct. `supply_date` defaults to the command time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkProduct {
    pub supplier_id: SupplierId,
    pub product_id: ProductId,
    pub supply_price: Money,
    pub supply_date: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierCommand {
    RegisterSupplier(RegisterSupplier),
    UpdateSupplier(UpdateSupplier),
    LinkProduct(LinkProduct),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRegistered {
    pub supplier_id: SupplierId,
    pub name: String,
    pub contacts: String,
    pub email: String,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierUpdated {
    pub supplier_id: SupplierId,
    pub name: String,
    pub contacts: String,
    pub email: String,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLinked {
    pub supplier_id: SupplierId,
    pub product: SuppliedProduct,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierEvent {
    SupplierRegistered(SupplierRegistered),
    SupplierUpdated(SupplierUpdated),
    ProductLinked(ProductLinked),
}

impl SupplierEvent {
    pub fn supplier_id(&self) -> SupplierId {
        match self {
            SupplierEvent::SupplierRegistered(e) => e.supplier_id,
            SupplierEvent::SupplierUpdated(e) => e.supplier_id,
            SupplierEvent::ProductLinked(e) => e.supplier_id,
        }
    }
}

impl Event for SupplierEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SupplierEvent::SupplierRegistered(_) => "parties.supplier.registered",
            SupplierEvent::SupplierUpdated(_) => "parties.supplier.updated",
            SupplierEvent::ProductLinked(_) => "parties.supplier.product_linked",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SupplierEvent::SupplierRegistered(e) => e.occurred_at,
            SupplierEvent::SupplierUpdated(e) => e.occurred_at,
            SupplierEvent::ProductLinked(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Supplier {
    type Command = SupplierCommand;
    type Event = SupplierEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SupplierEvent::SupplierRegistered(e) => {
                self.id = e.supplier_id;
                self.name = e.name.clone();
                self.contacts = e.contacts.clone();
                self.email = e.email.clone();
                self.address = e.address.clone();
                self.created = true;
            }
            SupplierEvent::SupplierUpdated(e) => {
                self.name = e.name.clone();
                self.contacts = e.contacts.clone();
                self.email = e.email.clone();
                self.address = e.address.clone();
            }
            SupplierEvent::ProductLinked(e) => {
                self.products.push(e.product.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SupplierCommand::RegisterSupplier(cmd) => self.handle_register(cmd),
            SupplierCommand::UpdateSupplier(cmd) => self.handle_update(cmd),
            SupplierCommand::LinkProduct(cmd) => self.handle_link(cmd),
        }
    }
}

impl Supplier {
    fn ensure_existing(&self, supplier_id: SupplierId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != supplier_id {
            return Err(DomainError::invariant("supplier_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterSupplier) -> Result<Vec<SupplierEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("supplier already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("supplier name cannot be empty"));
        }

        Ok(vec![SupplierEvent::SupplierRegistered(SupplierRegistered {
            supplier_id: cmd.supplier_id,
            name: cmd.name.trim().to_string(),
            contacts: cmd.contacts.trim().to_string(),
            email: cmd.email.trim().to_string(),
            address: cmd.address.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateSupplier) -> Result<Vec<SupplierEvent>, DomainError> {
        self.ensure_existing(cmd.supplier_id)?;

        let pick = |new: &Option<String>, old: &str| {
            new.as_deref().map(str::trim).unwrap_or(old).to_string()
        };
        let name = pick(&cmd.name, &self.name);
        if name.is_empty() {
            return Err(DomainError::validation("supplier name cannot be empty"));
        }

        Ok(vec![SupplierEvent::SupplierUpdated(SupplierUpdated {
            supplier_id: cmd.supplier_id,
            name,
            contacts: pick(&cmd.contacts, &self.contacts),
            email: pick(&cmd.email, &self.email),
            address: pick(&cmd.address, &self.address),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_link(&self, cmd: &LinkProduct) -> Result<Vec<SupplierEvent>, DomainError> {
        self.ensure_existing(cmd.supplier_id)?;
        if self.supplies(cmd.product_id) {
            return Err(DomainError::conflict("product is already linked to this supplier"));
        }
        if cmd.supply_price.is_zero() {
            return Err(DomainError::validation("supply price must be greater than zero"));
        }

        Ok(vec![SupplierEvent::ProductLinked(ProductLinked {
            supplier_id: cmd.supplier_id,
            product: SuppliedProduct {
                product_id: cmd.product_id,
                supply_price: cmd.supply_price,
                supply_date: cmd.supply_date.unwrap_or(cmd.occurred_at),
            },
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use woodhop_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered() -> Supplier {
        let id = SupplierId::new(AggregateId::new());
        let mut supplier = Supplier::empty(id);
        execute(
            &mut supplier,
            &SupplierCommand::RegisterSupplier(RegisterSupplier {
                supplier_id: id,
                name: "Ashanti Timber".to_string(),
                contacts: "0200000000".to_string(),
                email: "sales@ashanti-timber.test".to_string(),
                address: "Obuasi".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        supplier
    }

    fn link(supplier: &Supplier, product_id: ProductId) -> SupplierCommand {
        SupplierCommand::LinkProduct(LinkProduct {
            supplier_id: supplier.id_typed(),
            product_id,
            supply_price: Money::from_cents(4_500),
            supply_date: None,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn linking_the_same_product_twice_is_conflict() {
        let mut supplier = registered();
        let product_id = ProductId::new(AggregateId::new());

        let cmd = link(&supplier, product_id);
        execute(&mut supplier, &cmd).unwrap();
        assert!(supplier.supplies(product_id));
        assert_eq!(supplier.products()[0].supply_price, Money::from_cents(4_500));

        let err = supplier.handle(&link(&supplier, product_id)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn register_rejects_blank_name() {
        let id = SupplierId::new(AggregateId::new());
        let err = Supplier::empty(id)
            .handle(&SupplierCommand::RegisterSupplier(RegisterSupplier {
                supplier_id: id,
                name: " ".to_string(),
                contacts: String::new(),
                email: String::new(),
                address: String::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let mut supplier = registered();
        let cmd = SupplierCommand::UpdateSupplier(UpdateSupplier {
            supplier_id: supplier.id_typed(),
            name: None,
            contacts: None,
            email: None,
            address: Some("Takoradi".to_string()),
            occurred_at: test_time(),
        });
        execute(&mut supplier, &cmd).unwrap();

        assert_eq!(supplier.name(), "Ashanti Timber");
        assert_eq!(supplier.address(), "Takoradi");
        assert_eq!(supplier.version(), 2);
    }

    #[test]
    fn link_on_unknown_supplier_is_not_found() {
        let supplier = Supplier::empty(SupplierId::new(AggregateId::new()));
        let err = supplier
            .handle(&link(&supplier, ProductId::new(AggregateId::new())))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}
