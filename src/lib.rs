//! Storefront API
//!
//! Backend for a single-brand online store.
//!
//! ## Features
//! - Product catalog with categories, CSV import and export
//! - Cart, wishlist and checkout with Razorpay payments
//! - Shipment booking and tracking through Shiprocket
//! - Announcements and banners with Cloudinary image uploads
//! - Password and email-code sign-in over cookie sessions
//! - Back-office routes with a live event stream

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::router;
pub use state::{AppState, Services};
