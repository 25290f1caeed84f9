//! Value objects: compared by their attributes, never by identity.
//!
//! A `Money` of 12.50 is interchangeable with any other `Money` of 12.50, while
//! two customers with the same name are still two customers. Value objects are
//! immutable; "changing" one means building a new value.

/// Marker trait for value objects.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
