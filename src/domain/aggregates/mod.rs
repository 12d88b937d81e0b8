//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod user;
pub mod content;

pub use product::{Product, ProductDetails, ProductError, ProductStatus};
pub use order::{Order, OrderError, OrderStatus, LineItem, PaymentRecord, PaymentStatus, ShipmentRecord};
pub use cart::{Cart, CartError, CartLine, Wishlist, MAX_LINE_QUANTITY};
pub use user::{Address, AddressFields, Role, User, UserError, UserProfile};
pub use content::{Announcement, Banner, BannerKind, Category};
