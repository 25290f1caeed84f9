//! Shopping cart held per browser session, before checkout turns it into an order.

use serde::{Deserialize, Serialize};

use woodhop_core::{DomainError, Money};
use woodhop_products::ProductId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u64,
    pub product_type: String,
}

impl CartLine {
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.unit_price.cents().saturating_mul(self.quantity))
    }
}

/// Cart contents in insertion order, at most one line per product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product; an existing line for the same product grows instead.
    pub fn add(&mut self, line: CartLine) -> Result<(), DomainError> {
        if line.quantity == 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        match self.lines.iter_mut().find(|l| l.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or_else(|| DomainError::validation("quantity too large"))?;
                existing.unit_price = line.unit_price;
                existing.name = line.name;
                existing.product_type = line.product_type;
            }
            None => self.lines.push(line),
        }
        Ok(())
    }

    /// Returns whether a line was removed.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        self.lines.len() != before
    }

    /// Zero removes the line. Returns whether the product was in the cart.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: u64) -> bool {
        if quantity == 0 {
            return self.remove(product_id);
        }
        match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => {
                line.quantity = quantity;
                true
            }
            None => false,
        }
    }

    /// Number of items (sum of quantities).
    pub fn count(&self) -> u64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn total(&self) -> Money {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use woodhop_core::AggregateId;

    fn line(product_id: ProductId, quantity: u64, cents: u64) -> CartLine {
        CartLine {
            product_id,
            name: "Mahogany plank".to_string(),
            unit_price: Money::from_cents(cents),
            quantity,
            product_type: "Timber".to_string(),
        }
    }

    #[test]
    fn adding_same_product_merges_quantities() {
        let mut cart = Cart::new();
        let product = ProductId::new(AggregateId::new());
        cart.add(line(product, 2, 1_000)).unwrap();
        cart.add(line(product, 3, 1_000)).unwrap();
        cart.add(line(ProductId::new(AggregateId::new()), 1, 250)).unwrap();

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.count(), 6);
        assert_eq!(cart.total(), Money::from_cents(5_250));
    }

    #[test]
    fn zero_quantity_add_is_rejected() {
        let mut cart = Cart::new();
        assert!(cart.add(line(ProductId::new(AggregateId::new()), 0, 100)).is_err());
        assert!(cart.is_empty());
    }

    #[test]
    fn set_quantity_and_remove() {
        let mut cart = Cart::new();
        let product = ProductId::new(AggregateId::new());
        cart.add(line(product, 2, 100)).unwrap();

        assert!(cart.set_quantity(product, 7));
        assert_eq!(cart.count(), 7);
        assert!(cart.set_quantity(product, 0));
        assert!(cart.is_empty());
        assert!(!cart.remove(product));
    }

    #[test]
    fn clear_empties_the_cart() {
        let mut cart = Cart::new();
        cart.add(line(ProductId::new(AggregateId::new()), 1, 100)).unwrap();
        cart.clear();
        assert_eq!(cart.count(), 0);
        assert_eq!(cart.total(), Money::ZERO);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: the cart total is the sum of line subtotals and the count
            /// is the sum of every quantity ever added.
            #[test]
            fn totals_follow_lines(adds in prop::collection::vec((0usize..4, 1u64..20), 0..30)) {
                let products: Vec<ProductId> = (0..4).map(|_| ProductId::new(AggregateId::new())).collect();
                let mut cart = Cart::new();
                let mut expected_count = 0u64;
                let mut expected_total = 0u64;

                for (idx, qty) in adds {
                    cart.add(line(products[idx], qty, 150)).unwrap();
                    expected_count += qty;
                    expected_total += qty * 150;
                }

                prop_assert!(cart.lines().len() <= 4);
                prop_assert_eq!(cart.count(), expected_count);
                prop_assert_eq!(cart.total(), Money::from_cents(expected_total));
            }
        }
    }
}
