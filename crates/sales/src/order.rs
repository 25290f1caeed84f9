use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use woodhop_core::{Aggregate, AggregateId, AggregateRoot, CustomerId, DomainError, Money};
use woodhop_events::Event;
use woodhop_products::ProductId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOption {
    #[default]
    Pickup,
    Delivery,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

/// Order lifecycle. Only `Processing` orders accept line changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Processing,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Scheduled,
    InTransit,
    Delivered,
    Failed,
}

/// One order line (OrderItem).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    /// Vendor owning the product when the line was added.
    pub vendor_id: Option<CustomerId>,
    pub quantity: u64,
    pub unit_price: Money,
    pub subtotal: Money,
    /// Stock could not be deducted; the line waits for restock.
    pub backordered: bool,
    pub removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub delivery_date: DateTime<Utc>,
    pub address: String,
    pub driver_name: String,
    pub transport_cost: Money,
    pub status: DeliveryStatus,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    customer_id: Option<CustomerId>,
    order_date: Option<DateTime<Utc>>,
    delivery_option: DeliveryOption,
    payment_status: PaymentStatus,
    status: OrderStatus,
    description: String,
    lines: Vec<OrderLine>,
    delivery: Option<Delivery>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            customer_id: None,
            order_date: None,
            delivery_option: DeliveryOption::default(),
            payment_status: PaymentStatus::default(),
            status: OrderStatus::default(),
            description: String::new(),
            lines: Vec::new(),
            delivery: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn order_date(&self) -> Option<DateTime<Utc>> {
        self.order_date
    }

    pub fn delivery_option(&self) -> DeliveryOption {
        self.delivery_option
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// All lines ever added, removed ones included.
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn active_lines(&self) -> impl Iterator<Item = &OrderLine> {
        self.lines.iter().filter(|l| !l.removed)
    }

    pub fn delivery(&self) -> Option<&Delivery> {
        self.delivery.as_ref()
    }

    /// Sum of subtotals over lines that were not removed.
    pub fn total(&self) -> Money {
        self.active_lines().map(|l| l.subtotal).sum()
    }

    pub fn is_modifiable(&self) -> bool {
        self.created && self.status == OrderStatus::Processing
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub delivery_option: DeliveryOption,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub vendor_id: Option<CustomerId>,
    pub quantity: u64,
    pub unit_price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub order_id: OrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: BackorderLine. Issued as compensation when stock cannot be deducted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackorderLine {
    pub order_id: OrderId,
    pub line_no: u32,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePaymentStatus {
    pub order_id: OrderId,
    pub status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignDelivery {
    pub order_id: OrderId,
    pub delivery_date: DateTime<Utc>,
    pub address: String,
    pub driver_name: String,
    pub transport_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDeliveryStatus {
    pub order_id: OrderId,
    pub status: DeliveryStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    AddLine(AddLine),
    RemoveLine(RemoveLine),
    BackorderLine(BackorderLine),
    UpdatePaymentStatus(UpdatePaymentStatus),
    UpdateOrderStatus(UpdateOrderStatus),
    CancelOrder(CancelOrder),
    AssignDelivery(AssignDelivery),
    UpdateDeliveryStatus(UpdateDeliveryStatus),
}

impl OrderCommand {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderCommand::PlaceOrder(c) => c.order_id,
            OrderCommand::AddLine(c) => c.order_id,
            OrderCommand::RemoveLine(c) => c.order_id,
            OrderCommand::BackorderLine(c) => c.order_id,
            OrderCommand::UpdatePaymentStatus(c) => c.order_id,
            OrderCommand::UpdateOrderStatus(c) => c.order_id,
            OrderCommand::CancelOrder(c) => c.order_id,
            OrderCommand::AssignDelivery(c) => c.order_id,
            OrderCommand::UpdateDeliveryStatus(c) => c.order_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub delivery_option: DeliveryOption,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub order_id: OrderId,
    pub line: OrderLine,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub order_id: OrderId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineBackordered {
    pub order_id: OrderId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusChanged {
    pub order_id: OrderId,
    pub status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAssigned {
    pub order_id: OrderId,
    pub delivery: Delivery,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatusChanged {
    pub order_id: OrderId,
    pub status: DeliveryStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    LineAdded(LineAdded),
    LineRemoved(LineRemoved),
    LineBackordered(LineBackordered),
    PaymentStatusChanged(PaymentStatusChanged),
    OrderStatusChanged(OrderStatusChanged),
    OrderCancelled(OrderCancelled),
    DeliveryAssigned(DeliveryAssigned),
    DeliveryStatusChanged(DeliveryStatusChanged),
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::OrderPlaced(e) => e.order_id,
            OrderEvent::LineAdded(e) => e.order_id,
            OrderEvent::LineRemoved(e) => e.order_id,
            OrderEvent::LineBackordered(e) => e.order_id,
            OrderEvent::PaymentStatusChanged(e) => e.order_id,
            OrderEvent::OrderStatusChanged(e) => e.order_id,
            OrderEvent::OrderCancelled(e) => e.order_id,
            OrderEvent::DeliveryAssigned(e) => e.order_id,
            OrderEvent::DeliveryStatusChanged(e) => e.order_id,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "sales.order.placed",
            OrderEvent::LineAdded(_) => "sales.order.line_added",
            OrderEvent::LineRemoved(_) => "sales.order.line_removed",
            OrderEvent::LineBackordered(_) => "sales.order.line_backordered",
            OrderEvent::PaymentStatusChanged(_) => "sales.order.payment_status_changed",
            OrderEvent::OrderStatusChanged(_) => "sales.order.status_changed",
            OrderEvent::OrderCancelled(_) => "sales.order.cancelled",
            OrderEvent::DeliveryAssigned(_) => "sales.order.delivery_assigned",
            OrderEvent::DeliveryStatusChanged(_) => "sales.order.delivery_status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::LineAdded(e) => e.occurred_at,
            OrderEvent::LineRemoved(e) => e.occurred_at,
            OrderEvent::LineBackordered(e) => e.occurred_at,
            OrderEvent::PaymentStatusChanged(e) => e.occurred_at,
            OrderEvent::OrderStatusChanged(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::DeliveryAssigned(e) => e.occurred_at,
            OrderEvent::DeliveryStatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.customer_id = Some(e.customer_id);
                self.order_date = Some(e.occurred_at);
                self.delivery_option = e.delivery_option;
                self.description = e.description.clone();
                self.payment_status = PaymentStatus::Pending;
                self.status = OrderStatus::Processing;
                self.created = true;
            }
            OrderEvent::LineAdded(e) => {
                self.lines.push(e.line.clone());
            }
            OrderEvent::LineRemoved(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.removed = true;
                }
            }
            OrderEvent::LineBackordered(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.backordered = true;
                }
            }
            OrderEvent::PaymentStatusChanged(e) => {
                self.payment_status = e.status;
            }
            OrderEvent::OrderStatusChanged(e) => {
                self.status = e.to;
            }
            OrderEvent::OrderCancelled(_) => {
                self.status = OrderStatus::Cancelled;
            }
            OrderEvent::DeliveryAssigned(e) => {
                self.delivery = Some(e.delivery.clone());
            }
            OrderEvent::DeliveryStatusChanged(e) => {
                if let Some(delivery) = self.delivery.as_mut() {
                    delivery.status = e.status;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            OrderCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            OrderCommand::BackorderLine(cmd) => self.handle_backorder(cmd),
            OrderCommand::UpdatePaymentStatus(cmd) => self.handle_payment(cmd),
            OrderCommand::UpdateOrderStatus(cmd) => self.handle_status(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            OrderCommand::AssignDelivery(cmd) => self.handle_assign_delivery(cmd),
            OrderCommand::UpdateDeliveryStatus(cmd) => self.handle_delivery_status(cmd),
        }
    }
}

impl Order {
    fn ensure_existing(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_modifiable(&self) -> Result<(), DomainError> {
        if self.is_modifiable() {
            Ok(())
        } else {
            Err(DomainError::invariant(format!(
                "order lines cannot change once the order is {:?}",
                self.status
            )))
        }
    }

    fn live_line(&self, line_no: u32) -> Result<&OrderLine, DomainError> {
        match self.line(line_no) {
            Some(line) if !line.removed => Ok(line),
            Some(_) => Err(DomainError::conflict(format!("line {line_no} was already removed"))),
            None => Err(DomainError::not_found()),
        }
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            delivery_option: cmd.delivery_option,
            description: cmd.description.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;
        self.ensure_modifiable()?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        let subtotal = cmd
            .unit_price
            .checked_mul(cmd.quantity)
            .ok_or_else(|| DomainError::validation("line subtotal overflows"))?;

        let line_no = u32::try_from(self.lines.len() + 1)
            .map_err(|_| DomainError::invariant("too many order lines"))?;

        Ok(vec![OrderEvent::LineAdded(LineAdded {
            order_id: cmd.order_id,
            line: OrderLine {
                line_no,
                product_id: cmd.product_id,
                vendor_id: cmd.vendor_id,
                quantity: cmd.quantity,
                unit_price: cmd.unit_price,
                subtotal,
                backordered: false,
                removed: false,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;
        self.ensure_modifiable()?;
        let line = self.live_line(cmd.line_no)?;

        Ok(vec![OrderEvent::LineRemoved(LineRemoved {
            order_id: cmd.order_id,
            line_no: line.line_no,
            product_id: line.product_id,
            quantity: line.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_backorder(&self, cmd: &BackorderLine) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;
        let line = self.live_line(cmd.line_no)?;
        if line.backordered {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::LineBackordered(LineBackordered {
            order_id: cmd.order_id,
            line_no: line.line_no,
            product_id: line.product_id,
            quantity: line.quantity,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &UpdatePaymentStatus) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;
        if self.status == OrderStatus::Cancelled {
            return Err(DomainError::invariant("order is cancelled"));
        }
        if self.payment_status == cmd.status {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::PaymentStatusChanged(PaymentStatusChanged {
            order_id: cmd.order_id,
            status: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_status(&self, cmd: &UpdateOrderStatus) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;
        if self.status == cmd.status {
            return Ok(vec![]);
        }
        match (self.status, cmd.status) {
            (_, OrderStatus::Cancelled) => Err(DomainError::validation(
                "use CancelOrder to cancel an order",
            )),
            (OrderStatus::Processing, OrderStatus::Delivered) => {
                Ok(vec![OrderEvent::OrderStatusChanged(OrderStatusChanged {
                    order_id: cmd.order_id,
                    from: self.status,
                    to: cmd.status,
                    occurred_at: cmd.occurred_at,
                })])
            }
            (from, to) => Err(DomainError::invariant(format!(
                "order status cannot go from {from:?} to {to:?}"
            ))),
        }
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;
        match self.status {
            OrderStatus::Cancelled => Err(DomainError::conflict("order is already cancelled")),
            OrderStatus::Delivered => Err(DomainError::invariant("a delivered order cannot be cancelled")),
            OrderStatus::Processing => Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
                order_id: cmd.order_id,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }

    fn handle_assign_delivery(&self, cmd: &AssignDelivery) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;
        if self.delivery_option != DeliveryOption::Delivery {
            return Err(DomainError::invariant("pickup orders have no delivery"));
        }
        if self.status == OrderStatus::Cancelled {
            return Err(DomainError::invariant("order is cancelled"));
        }
        if self.delivery.is_some() {
            return Err(DomainError::conflict("order already has a delivery"));
        }
        if cmd.address.trim().is_empty() {
            return Err(DomainError::validation("delivery address cannot be empty"));
        }
        if cmd.driver_name.trim().is_empty() {
            return Err(DomainError::validation("driver name cannot be empty"));
        }

        Ok(vec![OrderEvent::DeliveryAssigned(DeliveryAssigned {
            order_id: cmd.order_id,
            delivery: Delivery {
                delivery_date: cmd.delivery_date,
                address: cmd.address.trim().to_string(),
                driver_name: cmd.driver_name.trim().to_string(),
                transport_cost: cmd.transport_cost,
                status: DeliveryStatus::Scheduled,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delivery_status(&self, cmd: &UpdateDeliveryStatus) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;
        let Some(delivery) = &self.delivery else {
            return Err(DomainError::invariant("order has no delivery assigned"));
        };
        if delivery.status == cmd.status {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::DeliveryStatusChanged(DeliveryStatusChanged {
            order_id: cmd.order_id,
            status: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }
}
