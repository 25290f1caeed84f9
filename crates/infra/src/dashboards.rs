//! Per-customer-type dashboards.
//!
//! Pure functions over read-model views and a caller-supplied `now`, so the
//! weekly windows are testable without a clock.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use woodhop_core::{CustomerId, Money};
use woodhop_parties::{CustomerType, StaffMember};
use woodhop_sales::OrderStatus;

use crate::projections::{CustomerView, InventoryView, OrderView, ProductView};

pub const RECENT_ORDERS: usize = 5;
const WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dashboard {
    Business(BusinessDashboard),
    Contractor(ContractorDashboard),
    Retailer(RetailerDashboard),
    Individual(IndividualDashboard),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySales {
    /// Weekday abbreviation (`Mon`, `Tue`, ...).
    pub label: String,
    pub date: NaiveDate,
    pub total: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesGrowth {
    /// Whole percent change of this week's earnings over the previous week.
    pub percent: i64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusinessDashboard {
    pub customer: CustomerView,
    pub total_products: usize,
    pub inventory_items: Vec<InventoryView>,
    pub staff_members: Vec<StaffMember>,
    pub weekly_earnings: Money,
    pub weekly_orders_count: usize,
    /// Seven buckets, oldest first, ending today.
    pub daily_sales: Vec<DailySales>,
    pub low_stock_count: usize,
    pub sales_growth: SalesGrowth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountTier {
    Bronze,
    Silver,
    Gold,
}

impl DiscountTier {
    pub fn from_total_spend(total: Money) -> Self {
        if total > Money::from_cents(5_000_00) {
            DiscountTier::Gold
        } else if total > Money::from_cents(2_000_00) {
            DiscountTier::Silver
        } else {
            DiscountTier::Bronze
        }
    }

    pub fn percent(self) -> u8 {
        match self {
            DiscountTier::Bronze => 10,
            DiscountTier::Silver => 15,
            DiscountTier::Gold => 20,
        }
    }

    pub fn label(self) -> String {
        let name = match self {
            DiscountTier::Bronze => "Bronze",
            DiscountTier::Silver => "Silver",
            DiscountTier::Gold => "Gold",
        };
        format!("{name} ({}%)", self.percent())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractorDashboard {
    pub customer: CustomerView,
    pub recent_orders: Vec<OrderView>,
    pub project_count: usize,
    pub active_shipments: usize,
    pub discount_tier: DiscountTier,
    pub discount_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetailerDashboard {
    pub customer: CustomerView,
    pub recent_orders: Vec<OrderView>,
    pub wholesale_status: &'static str,
    pub total_spent: Money,
    /// `total_spent` with thousands separators.
    pub balance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndividualDashboard {
    pub customer: CustomerView,
    pub recent_orders: Vec<OrderView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOrderOffer {
    pub discount_percent: u8,
    pub discount_label: String,
}

/// Bulk ordering is for professional accounts only.
pub fn bulk_order_offer(customer_type: CustomerType) -> Option<BulkOrderOffer> {
    let discount_percent = match customer_type {
        CustomerType::Contractor => 15,
        CustomerType::Retailer | CustomerType::Business => 10,
        CustomerType::Individual => return None,
    };
    Some(BulkOrderOffer {
        discount_percent,
        discount_label: format!("{discount_percent}%"),
    })
}

fn counts(order: &OrderView) -> bool {
    order.status != OrderStatus::Cancelled
}

fn newest_first(orders: &[OrderView]) -> Vec<OrderView> {
    let mut sorted = orders.to_vec();
    sorted.sort_by(|a, b| (b.order_date, b.order_id).cmp(&(a.order_date, a.order_id)));
    sorted
}

fn recent(orders: &[OrderView]) -> Vec<OrderView> {
    newest_first(orders).into_iter().take(RECENT_ORDERS).collect()
}

/// Sum of active line subtotals over the customer's non-cancelled orders.
pub fn total_spend(orders: &[OrderView]) -> Money {
    orders
        .iter()
        .filter(|o| counts(o))
        .map(|o| o.total)
        .sum()
}

/// Vendor earnings in `[from, to)`: the vendor's active lines of non-cancelled orders.
fn vendor_earnings(vendor: CustomerId, orders: &[OrderView], from: DateTime<Utc>, to: DateTime<Utc>) -> (Money, usize) {
    let mut total = Money::ZERO;
    let mut order_count = 0;
    for order in orders.iter().filter(|o| counts(o) && o.order_date >= from && o.order_date < to) {
        let mut sold_here = false;
        for line in order.active_lines().filter(|l| l.vendor_id == Some(vendor)) {
            total = total.saturating_add(line.subtotal);
            sold_here = true;
        }
        if sold_here {
            order_count += 1;
        }
    }
    (total, order_count)
}

fn growth(current: Money, previous: Money) -> SalesGrowth {
    let (cur, prev) = (current.cents() as i128, previous.cents() as i128);
    let percent = if prev == 0 {
        if cur > 0 { 100 } else { 0 }
    } else {
        ((cur - prev) * 100 / prev) as i64
    };
    let trend = match percent {
        p if p > 0 => Trend::Up,
        p if p < 0 => Trend::Down,
        _ => Trend::Flat,
    };
    SalesGrowth { percent, trend }
}

/// Vendor dashboard.
///
/// `products` and `inventory` are the vendor's own; `orders` may hold any
/// orders, only lines sold by this vendor are counted.
pub fn business_dashboard(
    customer: &CustomerView,
    products: &[ProductView],
    inventory: &[InventoryView],
    orders: &[OrderView],
    now: DateTime<Utc>,
) -> BusinessDashboard {
    let vendor = customer.customer_id;
    let week_ago = now - Duration::days(WEEK_DAYS);
    let two_weeks_ago = week_ago - Duration::days(WEEK_DAYS);
    let until = now + Duration::nanoseconds(1);

    let (weekly_earnings, weekly_orders_count) = vendor_earnings(vendor, orders, week_ago, until);
    let (previous_earnings, _) = vendor_earnings(vendor, orders, two_weeks_ago, week_ago);

    let today = now.date_naive();
    let daily_sales = (0..WEEK_DAYS)
        .rev()
        .map(|days_back| {
            let date = today - Duration::days(days_back);
            let total = orders
                .iter()
                .filter(|o| counts(o) && o.order_date.date_naive() == date)
                .flat_map(|o| o.active_lines())
                .filter(|l| l.vendor_id == Some(vendor))
                .map(|l| l.subtotal)
                .sum();
            DailySales {
                label: date.format("%a").to_string(),
                date,
                total,
            }
        })
        .collect();

    BusinessDashboard {
        customer: customer.clone(),
        total_products: products.len(),
        inventory_items: inventory.to_vec(),
        staff_members: customer.staff.clone(),
        weekly_earnings,
        weekly_orders_count,
        daily_sales,
        low_stock_count: inventory.iter().filter(|i| i.is_low_stock).count(),
        sales_growth: growth(weekly_earnings, previous_earnings),
    }
}

pub fn contractor_dashboard(customer: &CustomerView, orders: &[OrderView]) -> ContractorDashboard {
    let tier = DiscountTier::from_total_spend(total_spend(orders));
    ContractorDashboard {
        customer: customer.clone(),
        recent_orders: recent(orders),
        project_count: orders.len(),
        active_shipments: orders.iter().filter(|o| o.status == OrderStatus::Processing).count(),
        discount_tier: tier,
        discount_label: tier.label(),
    }
}

pub fn retailer_dashboard(customer: &CustomerView, orders: &[OrderView]) -> RetailerDashboard {
    let total_spent = total_spend(orders);
    RetailerDashboard {
        customer: customer.clone(),
        recent_orders: recent(orders),
        wholesale_status: "Active",
        total_spent,
        balance: total_spent.grouped(),
    }
}

pub fn individual_dashboard(customer: &CustomerView, orders: &[OrderView]) -> IndividualDashboard {
    IndividualDashboard {
        customer: customer.clone(),
        recent_orders: recent(orders),
    }
}
