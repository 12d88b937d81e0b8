//! Storefront domain: aggregates, value objects and the events they raise.

pub mod aggregates;
pub mod events;
pub mod value_objects;

pub use events::{DomainEvent, OrderEvent, ProductEvent};
pub use value_objects::{Money, MoneyError, Pincode, Quantity, Sku, SkuError};
