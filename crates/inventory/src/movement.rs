//! Stock actions and the counter arithmetic behind them.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use woodhop_core::{DomainError, ValueObject};

/// Kind of stock movement recorded in the inventory journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockAction {
    /// Goods received.
    In,
    /// Goods shipped or sold.
    Out,
    /// Broken or rotten stock written off.
    Damaged,
    /// Set aside for an order.
    Reserved,
    /// Returned from a reservation to available stock.
    Released,
}

impl StockAction {
    pub const ALL: [StockAction; 5] = [
        StockAction::In,
        StockAction::Out,
        StockAction::Damaged,
        StockAction::Reserved,
        StockAction::Released,
    ];

    pub fn code(self) -> &'static str {
        match self {
            StockAction::In => "IN",
            StockAction::Out => "OUT",
            StockAction::Damaged => "DAMAGED",
            StockAction::Reserved => "RESERVED",
            StockAction::Released => "RELEASED",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StockAction::In => "Stock In",
            StockAction::Out => "Stock Out",
            StockAction::Damaged => "Damaged Adjustment",
            StockAction::Reserved => "Reserved for Order",
            StockAction::Released => "Released from reservation",
        }
    }
}

impl core::fmt::Display for StockAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for StockAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StockAction::ALL
            .into_iter()
            .find(|a| a.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "unknown stock action '{s}' (expected IN, OUT, DAMAGED, RESERVED or RELEASED)"
                ))
            })
    }
}

/// Unit in which a product is stocked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitOfMeasure {
    #[default]
    Pcs,
    Planks,
    M3,
    Bundles,
}

impl UnitOfMeasure {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitOfMeasure::Pcs => "pcs",
            UnitOfMeasure::Planks => "planks",
            UnitOfMeasure::M3 => "m3",
            UnitOfMeasure::Bundles => "bundles",
        }
    }
}

impl FromStr for UnitOfMeasure {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pcs" => Ok(UnitOfMeasure::Pcs),
            "planks" => Ok(UnitOfMeasure::Planks),
            "m3" => Ok(UnitOfMeasure::M3),
            "bundles" => Ok(UnitOfMeasure::Bundles),
            other => Err(DomainError::validation(format!(
                "unknown unit of measure '{other}' (expected pcs, planks, m3 or bundles)"
            ))),
        }
    }
}

/// The three stock counters of an item.
///
/// All counters are unsigned; a movement that would take one below zero is
/// rejected instead of clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub available: u64,
    pub reserved: u64,
    pub damaged: u64,
}

impl ValueObject for StockLevels {}

impl StockLevels {
    /// Stock physically on hand and sellable or promised.
    pub fn total_stock(&self) -> u64 {
        self.available.saturating_add(self.reserved)
    }

    /// Counters after applying `action` for `quantity` units.
    pub fn after(self, action: StockAction, quantity: u64) -> Result<StockLevels, DomainError> {
        let mut next = self;
        match action {
            StockAction::In => {
                next.available = add(self.available, quantity)?;
            }
            StockAction::Out => {
                next.available = take(self.available, quantity, "available")?;
            }
            StockAction::Damaged => {
                next.available = take(self.available, quantity, "available")?;
                next.damaged = add(self.damaged, quantity)?;
            }
            StockAction::Reserved => {
                next.available = take(self.available, quantity, "available")?;
                next.reserved = add(self.reserved, quantity)?;
            }
            StockAction::Released => {
                next.reserved = take(self.reserved, quantity, "reserved")?;
                next.available = add(self.available, quantity)?;
            }
        }
        Ok(next)
    }
}

fn take(current: u64, quantity: u64, counter: &str) -> Result<u64, DomainError> {
    current.checked_sub(quantity).ok_or_else(|| {
        DomainError::invariant(format!(
            "insufficient {counter} stock (have {current}, need {quantity})"
        ))
    })
}

fn add(current: u64, quantity: u64) -> Result<u64, DomainError> {
    current
        .checked_add(quantity)
        .ok_or_else(|| DomainError::invariant("stock counter overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(available: u64, reserved: u64, damaged: u64) -> StockLevels {
        StockLevels {
            available,
            reserved,
            damaged,
        }
    }

    #[test]
    fn each_action_moves_the_right_counters() {
        let start = levels(10, 4, 1);
        assert_eq!(start.after(StockAction::In, 5).unwrap(), levels(15, 4, 1));
        assert_eq!(start.after(StockAction::Out, 3).unwrap(), levels(7, 4, 1));
        assert_eq!(start.after(StockAction::Damaged, 2).unwrap(), levels(8, 4, 3));
        assert_eq!(start.after(StockAction::Reserved, 6).unwrap(), levels(4, 10, 1));
        assert_eq!(start.after(StockAction::Released, 4).unwrap(), levels(14, 0, 1));
    }

    #[test]
    fn underflow_is_rejected_not_clamped() {
        let start = levels(2, 1, 0);
        match start.after(StockAction::Out, 3).unwrap_err() {
            DomainError::InvariantViolation(msg) => {
                assert!(msg.contains("insufficient available stock"))
            }
            _ => panic!("Expected InvariantViolation"),
        }
        match start.after(StockAction::Released, 2).unwrap_err() {
            DomainError::InvariantViolation(msg) => {
                assert!(msg.contains("insufficient reserved stock"))
            }
            _ => panic!("Expected InvariantViolation"),
        }
    }

    #[test]
    fn total_stock_is_available_plus_reserved() {
        assert_eq!(levels(7, 3, 50).total_stock(), 10);
    }

    #[test]
    fn parses_action_codes_case_insensitively() {
        assert_eq!("out".parse::<StockAction>().unwrap(), StockAction::Out);
        assert_eq!("RELEASED".parse::<StockAction>().unwrap(), StockAction::Released);
        assert!("LOST".parse::<StockAction>().is_err());
        assert_eq!("M3".parse::<UnitOfMeasure>().unwrap(), UnitOfMeasure::M3);
    }
}
