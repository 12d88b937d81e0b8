//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{Sku, Money, Quantity};
use crate::domain::events::{DomainEvent, ProductEvent};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    id: Uuid,
    sku: Sku,
    name: String,
    description: String,
    price: Money,
    mrp: Option<Money>,
    category_id: Option<Uuid>,
    sizes: Vec<String>,
    images: Vec<String>,
    tags: Vec<String>,
    stock: Quantity,
    weight_grams: u32,
    status: ProductStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Editable catalog fields, shared by create, update and CSV import.
#[derive(Clone, Debug)]
pub struct ProductDetails {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub mrp: Option<Money>,
    pub category_id: Option<Uuid>,
    pub sizes: Vec<String>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub weight_grams: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus { #[default] Draft, Active, Archived }

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Draft => "draft", Self::Active => "active", Self::Archived => "archived" }
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = ProductError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(ProductError::UnknownStatus(other.to_string())),
        }
    }
}

impl Product {
    pub fn create(sku: Sku, details: ProductDetails) -> Result<Self, ProductError> {
        validate(&details)?;
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut product = Self {
            id, sku: sku.clone(), name: details.name.trim().to_string(), description: details.description,
            price: details.price, mrp: details.mrp, category_id: details.category_id,
            sizes: details.sizes, images: details.images, tags: details.tags,
            stock: Quantity::default(), weight_grams: details.weight_grams,
            status: ProductStatus::Draft, created_at: now, updated_at: now, events: vec![],
        };
        product.raise_event(DomainEvent::Product(ProductEvent::Created { product_id: id, sku }));
        Ok(product)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn sku(&self) -> &Sku { &self.sku }
    pub fn name(&self) -> &str { &self.name }
    pub fn description(&self) -> &str { &self.description }
    pub fn price(&self) -> &Money { &self.price }
    pub fn mrp(&self) -> Option<&Money> { self.mrp.as_ref() }
    pub fn category_id(&self) -> Option<Uuid> { self.category_id }
    pub fn sizes(&self) -> &[String] { &self.sizes }
    pub fn images(&self) -> &[String] { &self.images }
    pub fn tags(&self) -> &[String] { &self.tags }
    pub fn stock(&self) -> Quantity { self.stock }
    pub fn weight_grams(&self) -> u32 { self.weight_grams }
    pub fn status(&self) -> ProductStatus { self.status }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn is_in_stock(&self) -> bool { !self.stock.is_zero() }
    pub fn is_active(&self) -> bool { self.status == ProductStatus::Active }

    /// Whether `qty` units can be sold right now. Products with sizes need one picked.
    pub fn is_purchasable(&self, qty: u32, size: Option<&str>) -> bool {
        let size_ok = match size {
            Some(s) => self.sizes.iter().any(|known| known.eq_ignore_ascii_case(s)),
            None => self.sizes.is_empty(),
        };
        self.is_active() && size_ok && qty > 0 && self.stock.value() >= qty
    }

    pub fn update(&mut self, details: ProductDetails) -> Result<(), ProductError> {
        validate(&details)?;
        self.name = details.name.trim().to_string();
        self.description = details.description;
        self.price = details.price;
        self.mrp = details.mrp;
        self.category_id = details.category_id;
        self.sizes = details.sizes;
        self.images = details.images;
        self.tags = details.tags;
        self.weight_grams = details.weight_grams;
        self.touch();
        Ok(())
    }

    pub fn publish(&mut self) -> Result<(), ProductError> {
        if self.name.is_empty() { return Err(ProductError::MissingName); }
        if !self.price.is_positive() { return Err(ProductError::InvalidPrice); }
        if self.status != ProductStatus::Active {
            self.status = ProductStatus::Active;
            self.raise_event(DomainEvent::Product(ProductEvent::Published { product_id: self.id }));
        }
        self.touch();
        Ok(())
    }

    pub fn archive(&mut self) { self.status = ProductStatus::Archived; self.touch(); }

    pub fn set_status(&mut self, status: ProductStatus) -> Result<(), ProductError> {
        match status {
            ProductStatus::Active => self.publish(),
            ProductStatus::Archived => { self.archive(); Ok(()) }
            ProductStatus::Draft => { self.status = ProductStatus::Draft; self.touch(); Ok(()) }
        }
    }

    pub fn set_stock(&mut self, qty: u32) { self.stock = Quantity::new(qty); self.touch(); }

    pub fn add_stock(&mut self, qty: u32) { self.stock = self.stock.add(qty); self.touch(); }

    pub fn remove_stock(&mut self, qty: u32) -> Result<(), ProductError> {
        self.stock = self.stock.subtract(qty).ok_or(ProductError::InsufficientStock)?;
        if self.stock.is_zero() {
            self.raise_event(DomainEvent::Product(ProductEvent::StockDepleted { product_id: self.id, sku: self.sku.clone() }));
        }
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn validate(details: &ProductDetails) -> Result<(), ProductError> {
    if details.name.trim().is_empty() { return Err(ProductError::MissingName); }
    if !details.price.is_positive() { return Err(ProductError::InvalidPrice); }
    if let Some(mrp) = &details.mrp {
        if mrp.currency() != details.price.currency() || mrp.amount() < details.price.amount() {
            return Err(ProductError::MrpBelowPrice);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Missing name")]
    MissingName,
    #[error("Price must be greater than zero")]
    InvalidPrice,
    #[error("MRP must not be below the selling price")]
    MrpBelowPrice,
    #[error("Insufficient stock")]
    InsufficientStock,
    #[error("Unknown product status: {0}")]
    UnknownStatus(String),
}
