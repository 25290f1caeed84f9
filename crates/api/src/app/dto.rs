use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use woodhop_core::Money;
use woodhop_infra::projections::{InventoryView, ProductView};
use woodhop_inventory::UnitOfMeasure;
use woodhop_parties::CustomerType;
use woodhop_sales::{Cart, CartLine, DeliveryOption, DeliveryStatus, OrderStatus, PaymentStatus};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub fullname: String,
    pub email: String,
    pub password: String,
    pub customer_type: String,
    #[serde(default)]
    pub location: String,
}

/// Either `code` or the six per-digit form fields.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    pub code: Option<String>,
    pub code_1: Option<String>,
    pub code_2: Option<String>,
    pub code_3: Option<String>,
    pub code_4: Option<String>,
    pub code_5: Option<String>,
    pub code_6: Option<String>,
}

impl VerifyRequest {
    pub fn digits(&self) -> [&str; 6] {
        [&self.code_1, &self.code_2, &self.code_3, &self.code_4, &self.code_5, &self.code_6]
            .map(|d| d.as_deref().unwrap_or(""))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenLoginRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ShopQuery {
    #[serde(rename = "type")]
    pub product_type: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CartAddRequest {
    pub product_id: String,
    pub quantity: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CartRemoveRequest {
    pub product_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub delivery_option: DeliveryOption,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    /// Decimal amount, e.g. `"45.50"`.
    pub price: String,
    pub grade: Option<String>,
    pub product_type: String,
    pub category: String,
    #[serde(default)]
    pub dimensions: String,
    #[serde(default)]
    pub description: String,
    /// Admins may create products on behalf of a vendor.
    pub vendor: Option<String>,
    #[serde(default)]
    pub initial_quantity: u64,
    pub reorder_level: Option<u64>,
    pub reorder_quantity: Option<u64>,
    pub uom: Option<String>,
    pub warehouse_location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub price: Option<String>,
    pub grade: Option<String>,
    pub product_type: Option<String>,
    pub category: Option<String>,
    pub dimensions: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddStaffRequest {
    pub fullname: String,
    pub role: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomerRequest {
    pub fullname: Option<String>,
    pub location: Option<String>,
    pub customer_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub delivery_option: DeliveryOption,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: u64,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryStatusRequest {
    pub status: DeliveryStatus,
}

#[derive(Debug, Deserialize)]
pub struct AssignDeliveryRequest {
    pub delivery_date: DateTime<Utc>,
    pub address: String,
    pub driver_name: String,
    pub transport_cost: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateInventoryRequest {
    pub product_id: String,
    #[serde(default)]
    pub initial_quantity: u64,
    pub reorder_level: Option<u64>,
    pub reorder_quantity: Option<u64>,
    pub uom: Option<String>,
    pub warehouse_location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigureInventoryRequest {
    pub reorder_level: Option<u64>,
    pub reorder_quantity: Option<u64>,
    pub uom: Option<String>,
    pub warehouse_location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MovementRequest {
    /// `IN`, `OUT`, `DAMAGED`, `RESERVED` or `RELEASED`.
    pub action: String,
    pub quantity: u64,
    #[serde(default)]
    pub note: String,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InventoryQuery {
    #[serde(default)]
    pub low_stock: bool,
}

#[derive(Debug, Deserialize)]
pub struct MovementLogQuery {
    pub product_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterSupplierRequest {
    pub name: String,
    #[serde(default)]
    pub contacts: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSupplierRequest {
    pub name: Option<String>,
    pub contacts: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LinkProductRequest {
    pub product_id: String,
    pub supply_price: String,
    pub supply_date: Option<DateTime<Utc>>,
}

// -------------------------
// Response view-models
// -------------------------

#[derive(Debug, Serialize)]
pub struct CartLineView {
    #[serde(flatten)]
    pub line: CartLine,
    pub subtotal: Money,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub count: u64,
    pub total: Money,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            lines: cart
                .lines()
                .iter()
                .map(|l| CartLineView {
                    subtotal: l.subtotal(),
                    line: l.clone(),
                })
                .collect(),
            count: cart.count(),
            total: cart.total(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductDetailView {
    pub product: ProductView,
    pub inventory: Option<InventoryView>,
    pub related_products: Vec<ProductView>,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_money(raw: &str, field: &'static str) -> Result<Money, axum::response::Response> {
    raw.parse()
        .map_err(|e: woodhop_core::DomainError| errors::json_error(StatusCode::BAD_REQUEST, "invalid_amount", format!("{field}: {e}")))
}

pub fn parse_uom(raw: Option<&str>) -> Result<Option<UnitOfMeasure>, axum::response::Response> {
    raw.map(|v| v.parse())
        .transpose()
        .map_err(|e: woodhop_core::DomainError| errors::json_error(StatusCode::BAD_REQUEST, "invalid_uom", e.to_string()))
}

pub fn parse_customer_type(raw: &str) -> Result<CustomerType, axum::response::Response> {
    raw.parse()
        .map_err(|e: woodhop_core::DomainError| errors::json_error(StatusCode::BAD_REQUEST, "invalid_customer_type", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_digit_codes_fill_missing_slots_with_blanks() {
        let req: VerifyRequest =
            serde_json::from_value(serde_json::json!({ "code_1": "1", "code_2": "2", "code_6": "6" })).unwrap();
        assert_eq!(req.digits(), ["1", "2", "", "", "", "6"]);
    }

    #[test]
    fn amounts_and_units_are_validated() {
        assert_eq!(parse_money("12.5", "price").unwrap(), Money::from_cents(1_250));
        assert_eq!(parse_money("abc", "price").unwrap_err().status(), StatusCode::BAD_REQUEST);
        assert_eq!(parse_uom(None).unwrap(), None);
        assert!(parse_uom(Some("furlongs")).is_err());
    }

    #[test]
    fn shop_query_reads_the_type_parameter() {
        let q: ShopQuery = serde_json::from_value(serde_json::json!({ "type": "Timber" })).unwrap();
        assert_eq!(q.product_type.as_deref(), Some("Timber"));
        assert!(q.search.is_none());
    }
}
