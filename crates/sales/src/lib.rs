//! Sales domain module: orders with their lines and delivery, and the session cart.
//!
//! Deterministic domain logic only (no IO, no HTTP, no storage). Stock is not
//! touched here; infra reacts to order events and records inventory movements.

pub mod cart;
pub mod order;

pub use cart::{Cart, CartLine};
pub use order::{
    AddLine, AssignDelivery, BackorderLine, CancelOrder, Delivery, DeliveryAssigned,
    DeliveryOption, DeliveryStatus, DeliveryStatusChanged, LineAdded, LineBackordered,
    LineRemoved, Order, OrderCancelled, OrderCommand, OrderEvent, OrderId, OrderLine,
    OrderPlaced, OrderStatus, OrderStatusChanged, PaymentStatus, PaymentStatusChanged,
    PlaceOrder, RemoveLine, UpdateDeliveryStatus, UpdateOrderStatus, UpdatePaymentStatus,
};
