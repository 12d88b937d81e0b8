//! User Aggregate: profile, address book, cart and wishlist in one document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::cart::{Cart, Wishlist};
use crate::domain::value_objects::Pincode;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    id: Uuid,
    name: String,
    email: String,
    phone: Option<String>,
    password_hash: Option<String>,
    role: Role,
    email_verified: bool,
    #[serde(default)]
    addresses: Vec<Address>,
    #[serde(default)]
    pub cart: Cart,
    #[serde(default)]
    pub wishlist: Wishlist,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role { #[default] Customer, Admin }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: Pincode,
    pub country: String,
    pub is_default: bool,
}

/// Address fields as submitted by the customer.
#[derive(Clone, Debug)]
pub struct AddressFields {
    pub name: String,
    pub phone: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: Pincode,
    pub country: Option<String>,
    pub is_default: bool,
}

/// What clients get to see of a user.
#[derive(Clone, Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    pub addresses: Vec<Address>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn register(name: impl Into<String>, email: &str, password_hash: Option<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.into().trim().to_string(), email: normalize_email(email), phone: None,
            password_hash, role, email_verified: false, addresses: vec![], cart: Cart::default(),
            wishlist: Wishlist::default(), created_at: now, updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn email(&self) -> &str { &self.email }
    pub fn role(&self) -> Role { self.role }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
    pub fn password_hash(&self) -> Option<&str> { self.password_hash.as_deref() }
    pub fn email_verified(&self) -> bool { self.email_verified }
    pub fn addresses(&self) -> &[Address] { &self.addresses }
    pub fn address(&self, id: Uuid) -> Option<&Address> { self.addresses.iter().find(|a| a.id == id) }
    pub fn default_address(&self) -> Option<&Address> { self.addresses.iter().find(|a| a.is_default) }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id, name: self.name.clone(), email: self.email.clone(), phone: self.phone.clone(),
            role: self.role, email_verified: self.email_verified, addresses: self.addresses.clone(), created_at: self.created_at,
        }
    }

    pub fn update_profile(&mut self, name: Option<String>, phone: Option<String>) {
        if let Some(name) = name { self.name = name.trim().to_string(); }
        if phone.is_some() { self.phone = phone; }
        self.touch();
    }

    pub fn clear_password(&mut self) { self.password_hash = None; self.touch(); }
    pub fn verify_email(&mut self) { self.email_verified = true; self.touch(); }
    pub fn promote_to_admin(&mut self) { self.role = Role::Admin; self.touch(); }

    /// The first address is always the default one.
    pub fn add_address(&mut self, fields: AddressFields) -> &Address {
        let make_default = fields.is_default || self.addresses.is_empty();
        if make_default { self.addresses.iter_mut().for_each(|a| a.is_default = false); }
        self.addresses.push(Address::from_fields(Uuid::now_v7(), fields, make_default));
        self.touch();
        &self.addresses[self.addresses.len() - 1]
    }

    pub fn update_address(&mut self, id: Uuid, fields: AddressFields) -> Result<&Address, UserError> {
        let pos = self.addresses.iter().position(|a| a.id == id).ok_or(UserError::AddressNotFound)?;
        let make_default = fields.is_default || self.addresses[pos].is_default;
        if make_default { self.addresses.iter_mut().for_each(|a| a.is_default = false); }
        self.addresses[pos] = Address::from_fields(id, fields, make_default);
        self.touch();
        Ok(&self.addresses[pos])
    }

    /// Removing the default address promotes the next one.
    pub fn remove_address(&mut self, id: Uuid) -> Result<(), UserError> {
        let pos = self.addresses.iter().position(|a| a.id == id).ok_or(UserError::AddressNotFound)?;
        let removed = self.addresses.remove(pos);
        if removed.is_default {
            if let Some(first) = self.addresses.first_mut() { first.is_default = true; }
        }
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl Address {
    fn from_fields(id: Uuid, f: AddressFields, is_default: bool) -> Self {
        Self {
            id, name: f.name.trim().to_string(), phone: f.phone.trim().to_string(), line1: f.line1.trim().to_string(),
            line2: f.line2.filter(|l| !l.trim().is_empty()), city: f.city.trim().to_string(), state: f.state.trim().to_string(),
            pincode: f.pincode, country: f.country.unwrap_or_else(|| "India".to_string()), is_default,
        }
    }

    /// Splits the recipient name into first and last name for APIs that want both.
    pub fn name_parts(&self) -> (&str, &str) {
        match self.name.split_once(' ') {
            Some((first, last)) => (first, last.trim()),
            None => (self.name.as_str(), ""),
        }
    }
}

pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserError {
    #[error("Address not found")]
    AddressNotFound,
}

#[cfg(test)]
impl Address {
    pub(crate) fn sample() -> Self {
        Self {
            id: Uuid::new_v4(), name: "Asha Rao".into(), phone: "9876543210".into(), line1: "12 MG Road".into(),
            line2: None, city: "Bengaluru".into(), state: "Karnataka".into(),
            pincode: Pincode::parse("560001").unwrap(), country: "India".into(), is_default: true,
        }
    }
}
