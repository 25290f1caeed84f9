use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use woodhop_core::{Aggregate, AggregateId, AggregateRoot, CustomerId, DomainError, Money};
use woodhop_events::Event;

/// Grade assigned when the vendor does not specify one.
pub const DEFAULT_GRADE: &str = "Standard";

/// Product identifier. The inventory item of a product shares this id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Listed,
    Removed,
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    price: Money,
    grade: String,
    product_type: String,
    category: String,
    dimensions: String,
    description: String,
    vendor: Option<CustomerId>,
    status: ProductStatus,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            price: Money::ZERO,
            grade: String::new(),
            product_type: String::new(),
            category: String::new(),
            dimensions: String::new(),
            description: String::new(),
            vendor: None,
            status: ProductStatus::Listed,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn grade(&self) -> &str {
        &self.grade
    }

    pub fn product_type(&self) -> &str {
        &self.product_type
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn vendor(&self) -> Option<CustomerId> {
        self.vendor
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    /// Defaults to [`DEFAULT_GRADE`].
    pub grade: Option<String>,
    pub product_type: String,
    pub category: String,
    pub dimensions: String,
    pub description: String,
    pub vendor: Option<CustomerId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct. `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub name: Option<String>,
    pub price: Option<Money>,
    pub grade: Option<String>,
    pub product_type: Option<String>,
    pub category: Option<String>,
    pub dimensions: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl UpdateProduct {
    /// An update that changes nothing yet; fill in fields with struct update syntax.
    pub fn new(product_id: ProductId, occurred_at: DateTime<Utc>) -> Self {
        Self {
            product_id,
            name: None,
            price: None,
            grade: None,
            product_type: None,
            category: None,
            dimensions: None,
            description: None,
            occurred_at,
        }
    }
}

/// Command: RemoveProduct (takes the product off the shop).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    RemoveProduct(RemoveProduct),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub grade: String,
    pub product_type: String,
    pub category: String,
    pub dimensions: String,
    pub description: String,
    pub vendor: Option<CustomerId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated (only the changed fields are set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub name: Option<String>,
    pub price: Option<Money>,
    pub grade: Option<String>,
    pub product_type: Option<String>,
    pub category: Option<String>,
    pub dimensions: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRemoved {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    ProductRemoved(ProductRemoved),
}

impl ProductEvent {
    pub fn product_id(&self) -> ProductId {
        match self {
            ProductEvent::ProductCreated(e) => e.product_id,
            ProductEvent::ProductUpdated(e) => e.product_id,
            ProductEvent::ProductRemoved(e) => e.product_id,
        }
    }
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "catalog.product.created",
            ProductEvent::ProductUpdated(_) => "catalog.product.updated",
            ProductEvent::ProductRemoved(_) => "catalog.product.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::ProductRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.price = e.price;
                self.grade = e.grade.clone();
                self.product_type = e.product_type.clone();
                self.category = e.category.clone();
                self.dimensions = e.dimensions.clone();
                self.description = e.description.clone();
                self.vendor = e.vendor;
                self.status = ProductStatus::Listed;
                self.created = true;
            }
            ProductEvent::ProductUpdated(e) => {
                if let Some(v) = &e.name {
                    self.name = v.clone();
                }
                if let Some(v) = e.price {
                    self.price = v;
                }
                if let Some(v) = &e.grade {
                    self.grade = v.clone();
                }
                if let Some(v) = &e.product_type {
                    self.product_type = v.clone();
                }
                if let Some(v) = &e.category {
                    self.category = v.clone();
                }
                if let Some(v) = &e.dimensions {
                    self.dimensions = v.clone();
                }
                if let Some(v) = &e.description {
                    self.description = v.clone();
                }
            }
            ProductEvent::ProductRemoved(_) => {
                self.status = ProductStatus::Removed;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::RemoveProduct(cmd) => self.handle_remove(cmd),
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_price(price: Money) -> Result<(), DomainError> {
    if price.is_zero() {
        return Err(DomainError::validation("price must be greater than zero"));
    }
    Ok(())
}

impl Product {
    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn ensure_listed(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.status == ProductStatus::Removed {
            return Err(DomainError::invariant("product has been removed from the catalog"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        self.ensure_product_id(cmd.product_id)?;
        require_text("name", &cmd.name)?;
        require_text("product_type", &cmd.product_type)?;
        require_text("category", &cmd.category)?;
        require_price(cmd.price)?;

        let grade = cmd
            .grade
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or(DEFAULT_GRADE)
            .to_string();

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            price: cmd.price,
            grade,
            product_type: cmd.product_type.trim().to_string(),
            category: cmd.category.trim().to_string(),
            dimensions: cmd.dimensions.trim().to_string(),
            description: cmd.description.clone(),
            vendor: cmd.vendor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_listed()?;
        self.ensure_product_id(cmd.product_id)?;

        if let Some(name) = &cmd.name {
            require_text("name", name)?;
        }
        if let Some(t) = &cmd.product_type {
            require_text("product_type", t)?;
        }
        if let Some(c) = &cmd.category {
            require_text("category", c)?;
        }
        if let Some(p) = cmd.price {
            require_price(p)?;
        }

        let nothing_changed = cmd.name.is_none()
            && cmd.price.is_none()
            && cmd.grade.is_none()
            && cmd.product_type.is_none()
            && cmd.category.is_none()
            && cmd.dimensions.is_none()
            && cmd.description.is_none();
        if nothing_changed {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            product_id: cmd.product_id,
            name: cmd.name.as_ref().map(|s| s.trim().to_string()),
            price: cmd.price,
            grade: cmd.grade.clone(),
            product_type: cmd.product_type.as_ref().map(|s| s.trim().to_string()),
            category: cmd.category.as_ref().map(|s| s.trim().to_string()),
            dimensions: cmd.dimensions.clone(),
            description: cmd.description.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_listed()?;
        self.ensure_product_id(cmd.product_id)?;

        Ok(vec![ProductEvent::ProductRemoved(ProductRemoved {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
