//! Cart and Wishlist Aggregates
//!
//! Both live inside the user document. Sync with a client-local copy is a
//! plain merge guarded by existence checks: lines already on the server win.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Upper bound for a single cart line.
pub const MAX_LINE_QUANTITY: u32 = 10;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    #[serde(default)]
    pub size: Option<String>,
    pub quantity: u32,
}

impl CartLine {
    fn same_item(&self, product_id: Uuid, size: Option<&str>) -> bool {
        self.product_id == product_id && self.size.as_deref().map(str::to_uppercase) == size.map(str::to_uppercase)
    }
}

impl Cart {
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn item_count(&self) -> u32 { self.lines.iter().map(|l| l.quantity).sum() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    pub fn add_item(&mut self, product_id: Uuid, size: Option<String>, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 { return Err(CartError::InvalidQuantity); }
        if let Some(existing) = self.lines.iter_mut().find(|l| l.same_item(product_id, size.as_deref())) {
            existing.quantity = (existing.quantity + quantity).min(MAX_LINE_QUANTITY);
        } else {
            self.lines.push(CartLine { product_id, size, quantity: quantity.min(MAX_LINE_QUANTITY) });
        }
        self.touch();
        Ok(())
    }

    pub fn set_quantity(&mut self, product_id: Uuid, size: Option<&str>, quantity: u32) -> Result<(), CartError> {
        if quantity > MAX_LINE_QUANTITY { return Err(CartError::InvalidQuantity); }
        let pos = self.lines.iter().position(|l| l.same_item(product_id, size)).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.lines.remove(pos); } else { self.lines[pos].quantity = quantity; }
        self.touch();
        Ok(())
    }

    /// Removes every line of `product_id`, whatever its size.
    pub fn remove_product(&mut self, product_id: Uuid) -> Result<(), CartError> {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() == before { return Err(CartError::ItemNotFound); }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.lines.clear(); self.touch(); }

    /// Adds local lines whose product and size are not already in the cart.
    /// Returns how many lines were added.
    pub fn merge_local(&mut self, local: impl IntoIterator<Item = CartLine>) -> usize {
        let mut added = 0;
        for line in local {
            if line.quantity == 0 || self.lines.iter().any(|l| l.same_item(line.product_id, line.size.as_deref())) {
                continue;
            }
            self.lines.push(CartLine { quantity: line.quantity.min(MAX_LINE_QUANTITY), ..line });
            added += 1;
        }
        if added > 0 { self.touch(); }
        added
    }

    fn touch(&mut self) { self.updated_at = Some(Utc::now()); }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wishlist { product_ids: Vec<Uuid> }

impl Wishlist {
    pub fn product_ids(&self) -> &[Uuid] { &self.product_ids }
    pub fn contains(&self, id: Uuid) -> bool { self.product_ids.contains(&id) }

    /// Returns false when the product was already listed.
    pub fn add(&mut self, id: Uuid) -> bool {
        if self.contains(id) { return false; }
        self.product_ids.push(id);
        true
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.product_ids.len();
        self.product_ids.retain(|p| *p != id);
        self.product_ids.len() != before
    }

    pub fn merge(&mut self, ids: impl IntoIterator<Item = Uuid>) -> usize {
        ids.into_iter().filter(|id| self.add(*id)).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Item not found in cart")]
    ItemNotFound,
    #[error("Quantity must be between 1 and 10")]
    InvalidQuantity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_operations() {
        let p1 = Uuid::new_v4();
        let mut cart = Cart::default();
        cart.add_item(p1, Some("M".into()), 2).unwrap();
        cart.add_item(p1, Some("m".into()), 1).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 3); // Merged
        cart.add_item(p1, Some("L".into()), 1).unwrap();
        assert_eq!(cart.item_count(), 4);
        cart.set_quantity(p1, Some("M"), 0).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.add_item(p1, None, 0), Err(CartError::InvalidQuantity));
    }

    #[test]
    fn test_line_quantity_is_capped() {
        let p1 = Uuid::new_v4();
        let mut cart = Cart::default();
        cart.add_item(p1, None, 8).unwrap();
        cart.add_item(p1, None, 8).unwrap();
        assert_eq!(cart.lines()[0].quantity, MAX_LINE_QUANTITY);
        assert_eq!(cart.set_quantity(p1, None, 11), Err(CartError::InvalidQuantity));
    }

    #[test]
    fn test_merge_local_keeps_server_lines() {
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        let mut cart = Cart::default();
        cart.add_item(p1, None, 1).unwrap();
        let added = cart.merge_local(vec![
            CartLine { product_id: p1, size: None, quantity: 5 },
            CartLine { product_id: p2, size: Some("S".into()), quantity: 2 },
            CartLine { product_id: p2, size: Some("S".into()), quantity: 3 },
        ]);
        assert_eq!(added, 1);
        assert_eq!(cart.lines()[0].quantity, 1);
        assert_eq!(cart.lines()[1].quantity, 2);
    }

    #[test]
    fn test_wishlist_merge_is_union() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut w = Wishlist::default();
        assert!(w.add(a));
        assert!(!w.add(a));
        assert_eq!(w.merge([a, b, b]), 1);
        assert_eq!(w.product_ids(), &[a, b]);
        assert!(w.remove(a));
        assert!(!w.remove(a));
    }
}
